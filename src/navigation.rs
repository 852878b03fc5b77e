use std::sync::{Mutex, PoisonError};

/// Host-side router. Fire-and-forget.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Remembers every navigation request; used by the demo and in tests.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        log::info!("Navigating to {target}");
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_string());
    }
}
