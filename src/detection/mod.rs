//! Periodic inference and what each result fans out to.

pub mod controller;
pub mod escalation;
pub mod history;
pub mod loop_worker;

pub use controller::InferenceController;
pub use escalation::{EscalationOutcome, EscalationPolicy};
pub use history::{HistoryTracker, DEFAULT_HISTORY_CAPACITY};
pub use loop_worker::{SkipReason, TickContext, TickOutcome};
