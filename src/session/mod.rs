//! The detection session: composite state plus the object that owns the
//! camera stream and classifier for their whole lifetime.

mod controller;
mod state;

pub use controller::{Session, MODEL_LOADING_MESSAGE, MODEL_LOAD_FAILED_MESSAGE};
pub use state::{DetectionState, SessionShared, SessionSnapshot, SessionState};
