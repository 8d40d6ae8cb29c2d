use std::sync::{Mutex, PoisonError};

use crate::models::StatsSnapshot;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    questions_asked: u64,
    documents_uploaded: u64,
    quizzes_taken: u64,
    flashcards_studied: u64,
    voice_queries: u64,
}

/// Process-lifetime usage counters shown on the dashboard
#[derive(Debug, Default)]
pub struct UsageStats {
    counters: Mutex<Counters>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut counters);
    }

    pub fn record_question(&self, voice: bool) {
        self.update(|c| {
            c.questions_asked += 1;
            if voice {
                c.voice_queries += 1;
            }
        });
    }

    pub fn record_upload(&self) {
        self.update(|c| c.documents_uploaded += 1);
    }

    /// Floored at zero
    pub fn record_removal(&self) {
        self.update(|c| c.documents_uploaded = c.documents_uploaded.saturating_sub(1));
    }

    pub fn record_quiz(&self) {
        self.update(|c| c.quizzes_taken += 1);
    }

    pub fn record_flashcards(&self, count: usize) {
        self.update(|c| c.flashcards_studied += count as u64);
    }

    pub fn snapshot(&self, topics_explored: usize) -> StatsSnapshot {
        let c = *self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        StatsSnapshot {
            questions_asked: c.questions_asked,
            documents_uploaded: c.documents_uploaded,
            topics_explored: topics_explored as u64,
            quizzes_taken: c.quizzes_taken,
            flashcards_studied: c.flashcards_studied,
            voice_queries: c.voice_queries,
        }
    }
}
