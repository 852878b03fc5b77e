//! Camera acquisition.
//!
//! The platform capture device sits behind [`VideoCaptureDevice`]; the
//! [`PermissionManager`] owns the granted stream for the lifetime of a
//! detection session and stops it on every exit path.

mod permission;

pub use permission::{PermissionManager, PermissionStatus};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Frame;
use crate::settings::CaptureConstraints;

#[async_trait]
pub trait VideoCaptureDevice: Send + Sync {
    /// Ask the platform for a live stream. A refusal is reported as
    /// `DetectionError::PermissionDenied`.
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Arc<dyn VideoStream>>;
}

pub trait VideoStream: Send + Sync {
    /// Most recent decoded frame; 0×0 until the first frame is rendered.
    fn latest_frame(&self) -> Frame;

    /// False once the device has ended the stream on its own.
    fn is_live(&self) -> bool;

    /// Stop every underlying track. Safe to call more than once.
    fn stop(&self);
}
