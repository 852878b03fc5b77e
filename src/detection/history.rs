use std::collections::VecDeque;

use crate::models::EmotionRecord;

pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Recent detections for display, newest first.
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    records: VecDeque<EmotionRecord>,
    capacity: usize,
}

impl HistoryTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: EmotionRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&EmotionRecord> {
        self.records.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmotionRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<EmotionRecord> {
        self.records.iter().cloned().collect()
    }
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmotionLabel, EmotionScores};

    fn record(label: EmotionLabel) -> EmotionRecord {
        EmotionRecord::new(label, 0.5, EmotionScores::zeroed())
    }

    #[test]
    fn length_is_min_of_pushes_and_capacity() {
        for pushes in 0..12 {
            let mut history = HistoryTracker::default();
            for _ in 0..pushes {
                history.push(record(EmotionLabel::Neutral));
            }
            assert_eq!(history.len(), pushes.min(5));
        }
    }

    #[test]
    fn newest_first_and_oldest_dropped() {
        let mut history = HistoryTracker::new(3);
        let records: Vec<_> = (0..4).map(|_| record(EmotionLabel::Happy)).collect();
        for r in &records {
            history.push(r.clone());
        }

        let ids: Vec<_> = history.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![records[3].id.clone(), records[2].id.clone(), records[1].id.clone()]);
        assert_eq!(history.latest().unwrap().id, records[3].id);
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let mut history = HistoryTracker::new(0);
        history.push(record(EmotionLabel::Sad));
        history.push(record(EmotionLabel::Fear));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.latest().unwrap().emotion, EmotionLabel::Fear);
    }
}
