use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for an uploaded file. The file content itself is never parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    /// Lowercase extension including the leading dot, empty when absent
    #[serde(rename = "type")]
    pub extension: String,
    pub size: u64,
    /// Display-only estimate, never used for retrieval
    pub chunks: u64,
    pub uploaded_at: DateTime<Utc>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sources: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sources: Some(sources),
            timestamp: Utc::now(),
        }
    }
}

/// Multiple-choice question as returned by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`
    pub correct: usize,
    pub explanation: String,
}

pub const QUIZ_OPTION_COUNT: usize = 4;

impl QuizQuestion {
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question text is empty".to_string());
        }
        if self.options.len() != QUIZ_OPTION_COUNT {
            return Err(format!(
                "expected {} options, got {}",
                QUIZ_OPTION_COUNT,
                self.options.len()
            ));
        }
        if self.correct >= self.options.len() {
            return Err(format!("correct index {} is out of range", self.correct));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

impl Flashcard {
    pub fn validate(&self) -> Result<(), String> {
        if self.front.trim().is_empty() || self.back.trim().is_empty() {
            return Err("flashcard has an empty side".to_string());
        }
        Ok(())
    }
}

/// Point-in-time copy of the usage counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub questions_asked: u64,
    pub documents_uploaded: u64,
    pub topics_explored: u64,
    pub quizzes_taken: u64,
    pub flashcards_studied: u64,
    pub voice_queries: u64,
}

// Request bodies. Required fields are optional here so that absence is
// reported as a validation error rather than a deserialization rejection.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub voice: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub topic: Option<String>,
    pub num_questions: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashcardRequest {
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRequest {
    pub selected_text: Option<String>,
    pub question: Option<String>,
}

// Response bodies

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub doc: Document,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub reply: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub success: bool,
    pub questions: Vec<QuizQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlashcardResponse {
    pub success: bool,
    pub flashcards: Vec<Flashcard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
