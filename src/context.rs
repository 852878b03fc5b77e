//! Longer-lived shared state that outlives a single detection session.
//!
//! The host owns the store and hands it to each [`crate::session::Session`];
//! nothing in this crate keeps it in a global.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::EmotionRecord;

pub trait EmotionStore: Send + Sync {
    fn set_current_emotion(&self, record: &EmotionRecord);
    fn append_emotion_history(&self, record: &EmotionRecord);
    fn sad_streak(&self) -> u32;
    fn set_sad_streak(&self, count: u32);
}

#[derive(Default)]
struct StoreData {
    current: Option<EmotionRecord>,
    history: Vec<EmotionRecord>,
    sad_streak: u32,
}

/// Process-local store; history is kept for as long as the store lives.
#[derive(Default)]
pub struct InMemoryEmotionStore {
    data: Mutex<StoreData>,
}

impl InMemoryEmotionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_emotion(&self) -> Option<EmotionRecord> {
        self.lock().current.clone()
    }

    /// Everything appended so far, oldest first.
    pub fn emotion_history(&self) -> Vec<EmotionRecord> {
        self.lock().history.clone()
    }
}

impl EmotionStore for InMemoryEmotionStore {
    fn set_current_emotion(&self, record: &EmotionRecord) {
        self.lock().current = Some(record.clone());
    }

    fn append_emotion_history(&self, record: &EmotionRecord) {
        self.lock().history.push(record.clone());
    }

    fn sad_streak(&self) -> u32 {
        self.lock().sad_streak
    }

    fn set_sad_streak(&self, count: u32) {
        self.lock().sad_streak = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmotionLabel, EmotionScores};

    #[test]
    fn keeps_current_and_full_history() {
        let store = InMemoryEmotionStore::new();
        let first = EmotionRecord::new(EmotionLabel::Happy, 0.9, EmotionScores::zeroed());
        let second = EmotionRecord::new(EmotionLabel::Sad, 0.6, EmotionScores::zeroed());

        store.set_current_emotion(&first);
        store.append_emotion_history(&first);
        store.set_current_emotion(&second);
        store.append_emotion_history(&second);

        assert_eq!(store.current_emotion().unwrap().id, second.id);
        let history = store.emotion_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
    }

    #[test]
    fn sad_streak_round_trips() {
        let store = InMemoryEmotionStore::new();
        assert_eq!(store.sad_streak(), 0);
        store.set_sad_streak(3);
        assert_eq!(store.sad_streak(), 3);
    }
}
