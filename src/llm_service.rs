use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::LLMConfig;
use crate::llm_providers::{JsonResponseParser, LLMError, LLMProviderFactory, TextGenerator};
use crate::models::{Document, Flashcard, QuizQuestion};
use crate::prompts;

// Import logging macros
use crate::log_llm_operation;

/// Why a structured generation request produced nothing usable
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Upstream(#[from] LLMError),

    #[error("model reply did not match the expected schema: {0}")]
    Schema(String),
}

/// Study-assistant operations on top of a text generator
#[derive(Clone)]
pub struct LLMService {
    generator: Arc<dyn TextGenerator>,
    json_parser: JsonResponseParser,
}

impl LLMService {
    pub fn from_config(config: &LLMConfig) -> Result<Self, LLMError> {
        let provider = LLMProviderFactory::create_provider(config)?;
        Ok(Self::with_generator(Arc::new(provider)))
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            json_parser: JsonResponseParser,
        }
    }

    /// Get the provider name for logging and testing
    pub fn provider_name(&self) -> &'static str {
        self.generator.provider_name()
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    async fn complete(&self, operation: &'static str, system_message: Option<&str>, prompt: &str) -> Result<String, LLMError> {
        log_llm_operation!(start, operation, provider = self.provider_name(), prompt_length = prompt.len());
        match self.generator.generate(system_message, prompt).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                log_llm_operation!(error, operation, provider = self.provider_name(), error = e);
                Err(e)
            }
        }
    }

    /// Free-form answer to a student question
    pub async fn answer_question(&self, document_names: &[String], message: &str) -> Result<String, LLMError> {
        let started = Instant::now();
        let prompt = prompts::chat_prompt(document_names, message);
        let reply = self.complete("chat", None, &prompt).await?;

        log_llm_operation!(
            success,
            "chat",
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            items = 1
        );
        Ok(reply)
    }

    /// Short answer about a highlighted passage
    pub async fn answer_highlight(
        &self,
        document_names: &[String],
        selected_text: &str,
        question: &str,
    ) -> Result<String, LLMError> {
        let started = Instant::now();
        let prompt = prompts::highlight_prompt(document_names, selected_text, question);
        let reply = self.complete("highlight", None, &prompt).await?;

        log_llm_operation!(
            success,
            "highlight",
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            items = 1
        );
        Ok(reply)
    }

    pub async fn generate_quiz(
        &self,
        documents: &[Document],
        topic: &str,
        num_questions: u32,
    ) -> Result<Vec<QuizQuestion>, GenerationError> {
        let started = Instant::now();
        let context = prompts::document_context_for_topic(documents, topic);
        let prompt = prompts::quiz_prompt(topic, num_questions, &context);

        let reply = self
            .complete("generate_quiz", Some(prompts::JSON_SYSTEM_MESSAGE), &prompt)
            .await?;
        let questions = self.decode_items(&reply, QuizQuestion::validate)?;

        if questions.len() != num_questions as usize {
            log_llm_operation!(
                warn,
                "generate_quiz",
                format!("requested {} questions, model returned {}", num_questions, questions.len())
            );
        }

        log_llm_operation!(
            success,
            "generate_quiz",
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            items = questions.len()
        );
        Ok(questions)
    }

    pub async fn generate_flashcards(
        &self,
        documents: &[Document],
        topic: &str,
        count: u32,
    ) -> Result<Vec<Flashcard>, GenerationError> {
        let started = Instant::now();
        let context = prompts::document_context_for_topic(documents, topic);
        let prompt = prompts::flashcard_prompt(topic, count, &context);

        let reply = self
            .complete("generate_flashcards", Some(prompts::JSON_SYSTEM_MESSAGE), &prompt)
            .await?;
        let cards = self.decode_items(&reply, Flashcard::validate)?;

        log_llm_operation!(
            success,
            "generate_flashcards",
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            items = cards.len()
        );
        Ok(cards)
    }

    /// Decode a JSON array out of the reply; any item failing `validate` rejects the whole reply
    fn decode_items<T>(&self, reply: &str, validate: fn(&T) -> Result<(), String>) -> Result<Vec<T>, GenerationError>
    where
        T: serde::de::DeserializeOwned,
    {
        let items: Vec<T> = self.json_parser.parse_json_response(reply).map_err(|e| {
            debug!(
                reply = %reply,
                extracted_json = %JsonResponseParser::extract_json_from_response(reply),
                "Unparseable model reply"
            );
            GenerationError::Schema(e.to_string())
        })?;

        if items.is_empty() {
            return Err(GenerationError::Schema("model returned an empty array".to_string()));
        }

        for (index, item) in items.iter().enumerate() {
            if let Err(reason) = validate(item) {
                warn!(item_index = index, reason = %reason, "Rejecting model reply");
                return Err(GenerationError::Schema(format!("item {}: {}", index, reason)));
            }
        }

        Ok(items)
    }
}
