use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Fear,
    Disgust,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Neutral,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Surprised,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "😐",
            EmotionLabel::Happy => "😊",
            EmotionLabel::Sad => "😢",
            EmotionLabel::Angry => "😠",
            EmotionLabel::Surprised => "😲",
            EmotionLabel::Fear => "😨",
            EmotionLabel::Disgust => "🤢",
        }
    }

    /// Labels that count towards the escalation streak.
    pub fn is_negative(&self) -> bool {
        matches!(self, EmotionLabel::Sad)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-class scores, one entry per label. Not required to sum to 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionScores(BTreeMap<EmotionLabel, f32>);

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every label present, all zero.
    pub fn zeroed() -> Self {
        Self(EmotionLabel::ALL.iter().map(|label| (*label, 0.0)).collect())
    }

    pub fn set(&mut self, label: EmotionLabel, score: f32) {
        self.0.insert(label, score);
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        self.0.get(&label).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        self.0.iter().map(|(label, score)| (*label, *score))
    }

    /// Highest-scoring label. Ties resolve to the label declared first.
    pub fn top(&self) -> Option<(EmotionLabel, f32)> {
        self.iter().fold(None, |best, (label, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((label, score)),
        })
    }
}

impl FromIterator<(EmotionLabel, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (EmotionLabel, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionRecord {
    pub id: String,
    pub emotion: EmotionLabel,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub all_scores: EmotionScores,
}

impl EmotionRecord {
    pub fn new(emotion: EmotionLabel, confidence: f32, all_scores: EmotionScores) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            emotion,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            all_scores,
        }
    }

    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }
}

impl fmt::Display for EmotionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}% confidence)",
            self.emotion.icon(),
            self.emotion,
            self.confidence_percent()
        )
    }
}
