use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::config::LLMConfig;

/// Failure kinds of a single call to the external generation API
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("{provider} request timed out after {timeout_secs}s")]
    Timeout {
        provider: &'static str,
        timeout_secs: u64,
    },

    #[error("{provider} API request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned an unreadable response: {message}")]
    MalformedResponse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned no content")]
    EmptyResponse { provider: &'static str },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl LLMError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LLMError::Timeout { .. })
    }

    /// Classify a reqwest failure, stripping the request URL so credentials in
    /// query strings never reach logs or responses
    fn from_reqwest(provider: &'static str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout {
                provider,
                timeout_secs: timeout.as_secs().max(1),
            }
        } else if err.is_decode() {
            LLMError::MalformedResponse {
                provider,
                message: err.without_url().to_string(),
            }
        } else {
            LLMError::Transport {
                provider,
                source: err.without_url(),
            }
        }
    }
}

/// Seam between request handling and the external model, substituted in tests
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt (with an optional system message) and return the reply text
    async fn generate(&self, system_message: Option<&str>, prompt: &str) -> Result<String, LLMError>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Common message structure for LLM requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Enum-based LLM provider implementation
#[derive(Debug, Clone)]
pub enum LLMProvider {
    OpenAI(OpenAIProvider),
    Gemini(GeminiProvider),
}

#[async_trait]
impl TextGenerator for LLMProvider {
    async fn generate(&self, system_message: Option<&str>, prompt: &str) -> Result<String, LLMError> {
        match self {
            LLMProvider::OpenAI(provider) => provider.make_request(system_message, prompt).await,
            LLMProvider::Gemini(provider) => provider.make_request(system_message, prompt).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI(_) => OpenAIProvider::NAME,
            LLMProvider::Gemini(_) => GeminiProvider::NAME,
        }
    }

    fn model_name(&self) -> &str {
        match self {
            LLMProvider::OpenAI(provider) => &provider.model,
            LLMProvider::Gemini(provider) => &provider.model,
        }
    }
}

fn build_client(timeout: Duration) -> Result<Client, LLMError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(LLMError::Client)
}

/// OpenAI-compatible provider implementation
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_output_tokens: u32,
}

/// OpenAI-specific request structures
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<LLMMessage>,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

impl OpenAIProvider {
    const NAME: &'static str = "OpenAI";

    pub fn new(config: &LLMConfig) -> Result<Self, LLMError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            timeout: config.timeout,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str) -> Result<String, LLMError> {
        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            messages.push(LLMMessage {
                role: "system".to_string(),
                content: sys_msg.to_string(),
            });
        }

        messages.push(LLMMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_output_tokens,
        };

        info!(
            provider = Self::NAME,
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(Self::NAME, self.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = Self::NAME,
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(LLMError::Status {
                provider: Self::NAME,
                status: status.as_u16(),
                body: error_text,
            });
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LLMError::from_reqwest(Self::NAME, self.timeout, e))?;

        let response_content = openai_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LLMError::EmptyResponse { provider: Self::NAME })?;

        info!(
            provider = Self::NAME,
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }
}

/// Gemini provider implementation
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_output_tokens: u32,
}

/// Gemini-specific request structures
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiProvider {
    const NAME: &'static str = "Gemini";

    pub fn new(config: &LLMConfig) -> Result<Self, LLMError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone().unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            timeout: config.timeout,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body(&self, system_message: Option<&str>, prompt: &str) -> GeminiRequest {
        let full_prompt = match system_message {
            Some(sys_msg) => format!("{}\n\n{}", sys_msg, prompt),
            None => prompt.to_string(),
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.9,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str) -> Result<String, LLMError> {
        let request_body = self.request_body(system_message, prompt);

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        info!(
            provider = Self::NAME,
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LLMError::from_reqwest(Self::NAME, self.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = Self::NAME,
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(LLMError::Status {
                provider: Self::NAME,
                status: status.as_u16(),
                body: error_text,
            });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LLMError::from_reqwest(Self::NAME, self.timeout, e))?;

        let response_content: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if response_content.trim().is_empty() {
            return Err(LLMError::EmptyResponse { provider: Self::NAME });
        }

        info!(
            provider = Self::NAME,
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }
}

/// Centralized JSON response parser with robust extraction logic
#[derive(Clone, Debug, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    /// Extract JSON from LLM responses that might be wrapped in markdown or other formatting
    pub fn extract_json_from_response(content: &str) -> String {
        // Try to find JSON within markdown code blocks
        if let Some(start) = content.find("```json") {
            if let Some(end) = content[start + 7..].find("```") {
                let json_start = start + 7;
                let json_end = json_start + end;
                return content[json_start..json_end].trim().to_string();
            }
        }

        // Try to find JSON within plain code blocks
        if let Some(start) = content.find("```") {
            if let Some(end) = content[start + 3..].find("```") {
                let json_start = start + 3;
                let json_end = json_start + end;
                let potential_json = content[json_start..json_end].trim();
                if potential_json.starts_with('{') || potential_json.starts_with('[') {
                    return potential_json.to_string();
                }
            }
        }

        // Otherwise take the span of whichever bracket kind opens first
        let first_array = content.find('[');
        let first_object = content.find('{');
        let (open, close) = match (first_array, first_object) {
            (Some(a), Some(o)) if o < a => (o, '}'),
            (Some(a), _) => (a, ']'),
            (None, Some(o)) => (o, '}'),
            (None, None) => return content.trim().to_string(),
        };

        match content.rfind(close) {
            Some(end) if end > open => content[open..=end].to_string(),
            _ => content.trim().to_string(),
        }
    }

    /// Parse JSON response into a specific type
    pub fn parse_json_response<T>(&self, content: &str) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let json_content = Self::extract_json_from_response(content);
        serde_json::from_str::<T>(&json_content)
    }
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LLMProviderType {
    OpenAI,
    Gemini,
}

impl LLMProviderFactory {
    /// Create a new LLM provider instance from configuration
    pub fn create_provider(config: &LLMConfig) -> Result<LLMProvider, LLMError> {
        Ok(match config.provider {
            LLMProviderType::OpenAI => LLMProvider::OpenAI(OpenAIProvider::new(config)?),
            LLMProviderType::Gemini => LLMProvider::Gemini(GeminiProvider::new(config)?),
        })
    }
}
