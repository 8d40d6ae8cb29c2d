use std::sync::{Mutex, PoisonError};

use crate::log_store_operation;
use crate::models::ChatMessage;

/// Ordered chat transcript. Prompt assembly never reads it back.
#[derive(Debug, Default)]
pub struct ChatTranscript {
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message and its reply together so they stay adjacent
    pub fn record_exchange(&self, question: ChatMessage, answer: ChatMessage) {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(question);
        messages.push(answer);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let count = messages.len();
        messages.clear();
        log_store_operation!(debug, "chat_transcript", "clear", count = count);
    }
}
