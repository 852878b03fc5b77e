use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::settings::CaptureConstraints;

use super::{VideoCaptureDevice, VideoStream};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    #[default]
    Unknown,
    Requesting,
    Granted,
    Denied,
}

pub struct PermissionManager {
    device: Arc<dyn VideoCaptureDevice>,
    constraints: CaptureConstraints,
    status: PermissionStatus,
    stream: Option<Arc<dyn VideoStream>>,
}

impl PermissionManager {
    pub fn new(device: Arc<dyn VideoCaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            status: PermissionStatus::Unknown,
            stream: None,
        }
    }

    pub fn status(&self) -> PermissionStatus {
        self.status
    }

    pub fn stream(&self) -> Option<Arc<dyn VideoStream>> {
        self.stream.clone()
    }

    /// Ask the device for a stream. Denials are recorded, never retried here;
    /// the caller re-invokes after the user asks again.
    pub async fn request_access(&mut self) -> PermissionStatus {
        if self.status == PermissionStatus::Granted {
            if let Some(stream) = &self.stream {
                if stream.is_live() {
                    return self.status;
                }
            }
        }

        // A stale stream from an earlier grant is stopped before asking again.
        self.release();
        self.status = PermissionStatus::Requesting;

        match self.device.acquire(&self.constraints).await {
            Ok(stream) => {
                info!(
                    "Camera access granted ({}x{} requested, facing {:?})",
                    self.constraints.ideal_width,
                    self.constraints.ideal_height,
                    self.constraints.facing_mode
                );
                self.stream = Some(stream);
                self.status = PermissionStatus::Granted;
            }
            Err(err) => {
                warn!("Camera permission denied: {err}");
                self.status = PermissionStatus::Denied;
            }
        }

        self.status
    }

    /// The device closed the stream underneath us; treated like a denial.
    pub fn mark_lost(&mut self) {
        warn!("Camera stream lost, releasing");
        self.release();
        self.status = PermissionStatus::Denied;
    }

    /// Stop every track of the held stream. Returns whether a stream was held.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                stream.stop();
                info!("Camera stream released");
                true
            }
            None => false,
        }
    }
}

impl Drop for PermissionManager {
    fn drop(&mut self) {
        self.release();
    }
}
