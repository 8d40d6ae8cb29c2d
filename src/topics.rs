use regex::Regex;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};

use crate::log_store_operation;

/// Number of topics returned for the UI quick-select list
pub const RECENT_TOPIC_LIMIT: usize = 8;

static KEYWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{4,}\b").expect("keyword pattern is valid"));

/// Lowercase alphabetic tokens of four or more letters, in order of appearance
pub fn extract_keywords(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    KEYWORD_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Default)]
struct TopicSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

/// Insertion-ordered set of topics explored in chat. Never pruned.
#[derive(Debug, Default)]
pub struct TopicTracker {
    inner: Mutex<TopicSet>,
}

impl TopicTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every keyword in `message`; returns how many were new
    pub fn record_message(&self, message: &str) -> usize {
        let keywords = extract_keywords(message);
        let mut topics = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut added = 0;
        for keyword in keywords {
            if topics.seen.insert(keyword.clone()) {
                topics.order.push(keyword);
                added += 1;
            }
        }

        log_store_operation!(debug, "topic_tracker", "record", count = added);
        added
    }

    /// Up to `limit` topics, most recently inserted first
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let topics = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        topics.order.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
