use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::camera::PermissionStatus;
use crate::classifier::ModelStatus;
use crate::detection::HistoryTracker;
use crate::models::{EmotionRecord, Overlay};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectionState {
    Idle,
    RequestingPermission,
    PermissionDenied,
    ModelLoading,
    ModelError,
    ModelReady,
    Detecting,
    /// Terminal: the session has been torn down.
    Unmounted,
}

impl DetectionState {
    pub fn description(&self) -> &'static str {
        match self {
            DetectionState::Idle => "Waiting to request camera access",
            DetectionState::RequestingPermission => "Requesting camera access",
            DetectionState::PermissionDenied => "Camera access denied",
            DetectionState::ModelLoading => "Loading emotion models",
            DetectionState::ModelError => "Emotion models failed to load",
            DetectionState::ModelReady => "Ready to detect",
            DetectionState::Detecting => "Detecting faces and expressions",
            DetectionState::Unmounted => "Session closed",
        }
    }
}

/// Composite session state: permission, model status and the user's
/// detecting switch, plus what the last ticks produced.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub permission: PermissionStatus,
    pub model: ModelStatus,
    pub is_detecting: bool,
    pub released: bool,
    pub current: Option<EmotionRecord>,
    pub history: HistoryTracker,
    pub overlay: Option<Overlay>,
    pub detection_error: Option<String>,
    pub sad_streak: u32,
}

impl SessionState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            permission: PermissionStatus::Unknown,
            model: ModelStatus::Unloaded,
            is_detecting: false,
            released: false,
            current: None,
            history: HistoryTracker::new(history_capacity),
            overlay: None,
            detection_error: None,
            sad_streak: 0,
        }
    }

    pub fn detection_state(&self) -> DetectionState {
        if self.released {
            return DetectionState::Unmounted;
        }
        match self.permission {
            PermissionStatus::Unknown => DetectionState::Idle,
            PermissionStatus::Requesting => DetectionState::RequestingPermission,
            PermissionStatus::Denied => DetectionState::PermissionDenied,
            PermissionStatus::Granted => match self.model {
                ModelStatus::Unloaded | ModelStatus::Loading => DetectionState::ModelLoading,
                ModelStatus::Error(_) => DetectionState::ModelError,
                ModelStatus::Ready if self.is_detecting => DetectionState::Detecting,
                ModelStatus::Ready => DetectionState::ModelReady,
            },
        }
    }

    /// Detecting is only reachable with a granted camera and a ready model.
    pub fn can_detect(&self) -> bool {
        !self.released && self.permission == PermissionStatus::Granted && self.model.is_ready()
    }

    pub fn on_record(&mut self, record: EmotionRecord, overlay: Overlay, sad_streak: u32) {
        self.history.push(record.clone());
        self.current = Some(record);
        self.overlay = Some(overlay);
        self.detection_error = None;
        self.sad_streak = sad_streak;
    }

    pub fn on_stream_lost(&mut self, message: &str) {
        self.permission = PermissionStatus::Denied;
        self.is_detecting = false;
        self.overlay = None;
        self.detection_error = Some(message.to_string());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.detection_state(),
            permission: self.permission,
            model: self.model.clone(),
            is_detecting: self.is_detecting,
            current: self.current.clone(),
            history: self.history.to_vec(),
            overlay: self.overlay.clone(),
            detection_error: self.detection_error.clone(),
            sad_streak: self.sad_streak,
        }
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: DetectionState,
    pub permission: PermissionStatus,
    pub model: ModelStatus,
    pub is_detecting: bool,
    pub current: Option<EmotionRecord>,
    pub history: Vec<EmotionRecord>,
    pub overlay: Option<Overlay>,
    pub detection_error: Option<String>,
    pub sad_streak: u32,
}

impl SessionSnapshot {
    /// Gentle prompt shown once sad detections start piling up.
    pub fn escalation_message(&self) -> Option<&'static str> {
        match self.sad_streak {
            0 => None,
            1 => Some("I notice you might be feeling down. If this continues, I'll be here to help."),
            _ => Some("I notice you might be feeling down. Let me connect you with therapeutic support."),
        }
    }

    /// Label for the start/stop toggle.
    pub fn control_label(&self) -> &'static str {
        if self.permission == PermissionStatus::Denied {
            "Allow Camera Access"
        } else if self.model.is_loading() {
            "Loading Models..."
        } else if self.is_detecting {
            "Stop Detection"
        } else if self.model.is_ready() {
            "Start Face Detection"
        } else {
            "Initializing..."
        }
    }
}

/// Session state behind a lock, republished to watchers on every change.
pub struct SessionShared {
    state: Mutex<SessionState>,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionShared {
    pub fn new(history_capacity: usize) -> Self {
        let state = SessionState::new(history_capacity);
        let (tx, _rx) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            tx,
        }
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.lock().await;
        let result = f(&mut guard);
        self.tx.send_replace(guard.snapshot());
        result
    }

    pub async fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }
}
