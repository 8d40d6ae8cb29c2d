use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Origins allowed for browser cross-origin calls; `None` allows any origin
    pub allowed_origins: Option<Vec<String>>,
}

/// Large Language Model service configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    pub timeout: Duration,
    /// Reply length cap sent with each request; sized for the largest quiz
    pub max_output_tokens: u32,
}

/// Local storage for uploaded files
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Bounds applied to quiz and flashcard generation requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub max_quiz_questions: u32,
    pub flashcard_count: u32,
}

/// Logging system configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_QUIZ_QUESTIONS: u32 = 5;
pub const DEFAULT_MAX_QUIZ_QUESTIONS: u32 = 20;
pub const DEFAULT_FLASHCARD_COUNT: u32 = 8;

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_quiz_questions: DEFAULT_MAX_QUIZ_QUESTIONS,
            flashcard_count: DEFAULT_FLASHCARD_COUNT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            server: ServerConfig::from_source(&lookup)?,
            llm: LLMConfig::from_source(&lookup)?,
            storage: StorageConfig::from_source(&lookup)?,
            generation: GenerationConfig::from_source(&lookup)?,
            logging: LoggingConfig::from_source(&lookup),
        };

        log_system_event!(config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_timeout_secs = self.llm.timeout.as_secs(),
            llm_max_output_tokens = self.llm.max_output_tokens,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            allowed_origins = ?self.server.allowed_origins,
            upload_dir = %self.storage.upload_dir.display(),
            max_upload_bytes = self.storage.max_upload_bytes,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.llm.timeout.is_zero() {
            return Err(anyhow!("LLM_TIMEOUT_SECS must be greater than 0"));
        }

        if self.llm.max_output_tokens == 0 {
            return Err(anyhow!("LLM_MAX_OUTPUT_TOKENS must be greater than 0"));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(anyhow!("MAX_UPLOAD_BYTES must be greater than 0"));
        }

        if self.generation.max_quiz_questions == 0 || self.generation.flashcard_count == 0 {
            return Err(anyhow!("MAX_QUIZ_QUESTIONS and FLASHCARD_COUNT must be greater than 0"));
        }

        if self.llm.api_key.is_empty() {
            warn!("LLM API key is empty - chat, quiz and flashcard generation will fail");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl ServerConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = parse_or(lookup, "PORT", DEFAULT_PORT)?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let allowed_origins = lookup("ALLOWED_ORIGINS").and_then(|raw| parse_origins(&raw));

        Ok(ServerConfig {
            port,
            host,
            allowed_origins,
        })
    }
}

impl LLMConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("LLM_API_KEY")
            .or_else(|| lookup("GEMINI_API_KEY"))
            .unwrap_or_default();

        let base_url = lookup("LLM_BASE_URL").filter(|url| !url.trim().is_empty());

        let provider_str = lookup("LLM_PROVIDER").unwrap_or_else(|| "gemini".to_string());
        let provider = parse_provider(&provider_str);

        let model = lookup("LLM_MODEL").filter(|model| !model.trim().is_empty());
        let timeout_secs = parse_or(lookup, "LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_output_tokens = parse_or(lookup, "LLM_MAX_OUTPUT_TOKENS", DEFAULT_MAX_OUTPUT_TOKENS)?;

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
            timeout: Duration::from_secs(timeout_secs),
            max_output_tokens,
        })
    }
}

impl StorageConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));
        let max_upload_bytes = parse_or(lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(StorageConfig {
            upload_dir,
            max_upload_bytes,
        })
    }
}

impl GenerationConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(GenerationConfig {
            max_quiz_questions: parse_or(lookup, "MAX_QUIZ_QUESTIONS", DEFAULT_MAX_QUIZ_QUESTIONS)?,
            flashcard_count: parse_or(lookup, "FLASHCARD_COUNT", DEFAULT_FLASHCARD_COUNT)?,
        })
    }

    /// Resolve the number of quiz questions to request from the model
    pub fn quiz_question_count(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(DEFAULT_QUIZ_QUESTIONS)
            .clamp(1, self.max_quiz_questions.max(1))
    }
}

impl LoggingConfig {
    fn from_source(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("RUST_LOG").unwrap_or_else(|| "info,study_assistant=debug".to_string());

        let file_enabled = lookup("LOG_FILE_ENABLED")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let console_enabled = lookup("LOG_CONSOLE_ENABLED")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let log_directory = lookup("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string());

        LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        }
    }
}

pub fn parse_provider(value: &str) -> LLMProviderType {
    match value.to_lowercase().as_str() {
        "gemini" | "google" => LLMProviderType::Gemini,
        "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
        _ => {
            info!("Unknown LLM provider '{}', defaulting to Gemini", value);
            LLMProviderType::Gemini
        }
    }
}

/// `*` or an empty list means any origin
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        None
    } else {
        Some(origins)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
