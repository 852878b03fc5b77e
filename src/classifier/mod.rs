//! Emotion classification.
//!
//! A [`ClassifierBackend`] produces raw per-class scores for a frame (for the
//! face-landmarker backends these come out of [`blendshape::score_emotions`]).
//! [`EmotionClassifier`] turns those into a label plus a confidence in [0, 1],
//! and [`ModelLifecycle`] owns the backend from creation to disposal.

pub mod adapter;
pub mod blendshape;
pub mod lifecycle;

pub use adapter::{Classification, EmotionClassifier};
pub use lifecycle::{ModelLifecycle, ModelStatus, PendingLoad};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EmotionScores, FaceBox, Frame};

/// Raw backend output for one frame.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub scores: EmotionScores,
    pub face: Option<FaceBox>,
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Load weights / warm up. Called once per instance.
    async fn initialize(&self) -> Result<()>;

    /// Score one decoded frame. Failing to find a face is an
    /// `DetectionError::Inference`.
    async fn infer(&self, frame: &Frame) -> Result<BackendOutput>;

    /// Free backend resources. Called exactly once per instance.
    fn dispose(&self);

    fn name(&self) -> &'static str;
}

pub trait ClassifierFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ClassifierBackend>>;
}
