use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectionError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    #[error("camera stream closed by the device")]
    StreamClosed,

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("emotion model is not ready")]
    ModelNotReady,

    #[error("emotion inference failed: {0}")]
    Inference(String),

    #[error("frame has no pixels yet ({width}x{height})")]
    InvalidFrame { width: u32, height: u32 },

    #[error("detection session already released")]
    SessionReleased,
}

impl DetectionError {
    /// Whether the presentation layer should show this to the user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, DetectionError::InvalidFrame { .. })
    }

    /// Whether the inference loop carries on after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectionError::Inference(_) | DetectionError::InvalidFrame { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
