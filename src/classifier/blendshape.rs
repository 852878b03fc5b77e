use std::collections::HashMap;

use crate::models::{EmotionLabel, EmotionScores};

type Term = (&'static [&'static str], f32);

// Each term averages the named coefficients and weights the average.
const HAPPY: &[Term] = &[
    (&["mouthSmileLeft", "mouthSmileRight"], 0.7),
    (&["cheekSquintLeft", "cheekSquintRight"], 0.3),
];

const SAD: &[Term] = &[
    (&["mouthFrownLeft", "mouthFrownRight"], 0.5),
    (&["browInnerUp"], 0.3),
    (&["mouthPucker"], 0.2),
];

const ANGRY: &[Term] = &[
    (&["browDownLeft", "browDownRight"], 0.6),
    (&["mouthPressLeft", "mouthPressRight"], 0.2),
    (&["eyeSquintLeft", "eyeSquintRight"], 0.2),
];

const SURPRISED: &[Term] = &[
    (&["eyeWideLeft", "eyeWideRight"], 0.4),
    (&["browOuterUpLeft", "browOuterUpRight"], 0.3),
    (&["jawOpen"], 0.3),
];

const FEAR: &[Term] = &[
    (&["eyeWideLeft", "eyeWideRight"], 0.3),
    (&["browInnerUp"], 0.3),
    (&["mouthStretchLeft", "mouthStretchRight"], 0.4),
];

const DISGUST: &[Term] = &[
    (&["noseSneerLeft", "noseSneerRight"], 0.6),
    (&["mouthUpperUpLeft", "mouthUpperUpRight"], 0.4),
];

const EXPRESSIVE: [(EmotionLabel, &[Term]); 6] = [
    (EmotionLabel::Happy, HAPPY),
    (EmotionLabel::Sad, SAD),
    (EmotionLabel::Angry, ANGRY),
    (EmotionLabel::Surprised, SURPRISED),
    (EmotionLabel::Fear, FEAR),
    (EmotionLabel::Disgust, DISGUST),
];

fn coefficient(blendshapes: &HashMap<String, f32>, name: &str) -> f32 {
    blendshapes
        .get(name)
        .copied()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

fn weighted(blendshapes: &HashMap<String, f32>, terms: &[Term]) -> f32 {
    terms
        .iter()
        .map(|(names, weight)| {
            let sum: f32 = names.iter().map(|name| coefficient(blendshapes, name)).sum();
            weight * sum / names.len() as f32
        })
        .sum::<f32>()
        .clamp(0.0, 1.0)
}

/// Convert face-landmarker blendshape coefficients into one score per label.
///
/// Missing or non-finite coefficients count as 0. Neutral is whatever the
/// strongest expression leaves over.
pub fn score_emotions(blendshapes: &HashMap<String, f32>) -> EmotionScores {
    let mut scores = EmotionScores::zeroed();
    let mut strongest = 0.0f32;

    for (label, terms) in EXPRESSIVE {
        let score = weighted(blendshapes, terms);
        strongest = strongest.max(score);
        scores.set(label, score);
    }

    scores.set(EmotionLabel::Neutral, 1.0 - strongest);
    scores
}
