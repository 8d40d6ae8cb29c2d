pub mod api;
pub mod config;
pub mod documents;
pub mod errors;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod stats;
pub mod topics;
pub mod transcript;
pub mod upload;

pub use config::Config;
pub use documents::DocumentStore;
pub use errors::*;
pub use llm_providers::{JsonResponseParser, LLMError, LLMProvider, LLMProviderFactory, LLMProviderType, TextGenerator};
pub use llm_service::{GenerationError, LLMService};
pub use models::*;
pub use stats::UsageStats;
pub use topics::TopicTracker;
pub use transcript::ChatTranscript;
