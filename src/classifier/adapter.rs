use std::sync::Arc;

use crate::error::{DetectionError, Result};
use crate::models::{EmotionLabel, EmotionScores, FaceBox, Frame};

use super::ClassifierBackend;

#[derive(Debug, Clone)]
pub struct Classification {
    pub emotion: EmotionLabel,
    /// Score of `emotion`, clamped to [0, 1].
    pub confidence: f32,
    pub all_scores: EmotionScores,
    pub face: Option<FaceBox>,
}

/// Ready-to-use view over an initialised backend.
///
/// Only handed out by [`super::ModelLifecycle`] once the backend is ready.
#[derive(Clone)]
pub struct EmotionClassifier {
    backend: Arc<dyn ClassifierBackend>,
}

impl EmotionClassifier {
    pub(crate) fn new(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn classify(&self, frame: &Frame) -> Result<Classification> {
        if !frame.is_decoded() {
            return Err(DetectionError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let output = self.backend.infer(frame).await?;
        let all_scores = complete_scores(output.scores)?;

        let (emotion, score) = all_scores
            .top()
            .ok_or_else(|| DetectionError::Inference("backend returned no scores".into()))?;

        Ok(Classification {
            emotion,
            confidence: score.clamp(0.0, 1.0),
            all_scores,
            face: output.face,
        })
    }
}

/// Fill in labels the backend left out and reject NaN/inf scores.
fn complete_scores(raw: EmotionScores) -> Result<EmotionScores> {
    if raw.is_empty() {
        return Err(DetectionError::Inference("backend returned no scores".into()));
    }

    let mut scores = EmotionScores::zeroed();
    for (label, score) in raw.iter() {
        if !score.is_finite() {
            return Err(DetectionError::Inference(format!(
                "non-finite score {score} for {label}"
            )));
        }
        scores.set(label, score);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::BackendOutput;
    use crate::simulated::ScriptedBackend;

    fn frame() -> Frame {
        Frame::from_raw(2, 2, vec![0; 12]).unwrap()
    }

    fn scores(pairs: &[(EmotionLabel, f32)]) -> EmotionScores {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn picks_top_label_and_fills_missing_scores() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_scores(scores(&[(EmotionLabel::Happy, 0.92), (EmotionLabel::Sad, 0.03)]));
        let classifier = EmotionClassifier::new(backend);

        let result = classifier.classify(&frame()).await.unwrap();
        assert_eq!(result.emotion, EmotionLabel::Happy);
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert_eq!(result.all_scores.len(), EmotionLabel::ALL.len());
    }

    #[tokio::test]
    async fn raw_scores_above_one_clamp_confidence() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_scores(scores(&[(EmotionLabel::Angry, 3.5)]));
        let classifier = EmotionClassifier::new(backend);

        let result = classifier.classify(&frame()).await.unwrap();
        assert_eq!(result.emotion, EmotionLabel::Angry);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.all_scores.get(EmotionLabel::Angry), 3.5);
    }

    #[tokio::test]
    async fn empty_frame_is_rejected_without_backend_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let classifier = EmotionClassifier::new(backend.clone());

        let err = classifier.classify(&Frame::empty()).await.unwrap_err();
        assert_eq!(err, DetectionError::InvalidFrame { width: 0, height: 0 });
        assert_eq!(backend.infer_count(), 0);
    }

    #[tokio::test]
    async fn nan_score_is_an_inference_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Ok(BackendOutput {
            scores: scores(&[(EmotionLabel::Fear, f32::NAN)]),
            face: None,
        }));
        let classifier = EmotionClassifier::new(backend);

        let err = classifier.classify(&frame()).await.unwrap_err();
        assert!(matches!(err, DetectionError::Inference(_)));
    }

    #[tokio::test]
    async fn backend_failure_passes_through() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(Err(DetectionError::Inference("no face detected".into())));
        let classifier = EmotionClassifier::new(backend);

        let err = classifier.classify(&frame()).await.unwrap_err();
        assert_eq!(err, DetectionError::Inference("no face detected".into()));
    }
}
