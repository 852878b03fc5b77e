use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use log::info;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::EmotionStore;
use crate::models::EmotionLabel;
use crate::navigation::Navigator;
use crate::settings::{EscalationMode, EscalationSettings};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EscalationOutcome {
    /// Not a negative emotion; the streak is untouched.
    Ignored,
    /// Streak went up but is still below the threshold.
    Counted { streak: u32 },
    /// A delayed navigation was scheduled.
    Scheduled { streak: u32 },
    /// Threshold already acted on (`EscalationMode::Once`) or the policy was
    /// cancelled; nothing new was scheduled.
    Suppressed { streak: u32 },
}

/// Counts sad detections in the shared store and schedules the support
/// navigation once the streak reaches the threshold.
///
/// The streak is never reset here.
pub struct EscalationPolicy {
    store: Arc<dyn EmotionStore>,
    navigator: Arc<dyn Navigator>,
    settings: EscalationSettings,
    latched: AtomicBool,
    cancel_token: CancellationToken,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EscalationPolicy {
    pub fn new(
        store: Arc<dyn EmotionStore>,
        navigator: Arc<dyn Navigator>,
        settings: EscalationSettings,
    ) -> Self {
        Self {
            store,
            navigator,
            settings,
            latched: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn streak(&self) -> u32 {
        self.store.sad_streak()
    }

    /// Must be called from within a tokio runtime; the delay runs as a task.
    pub fn on_detection(&self, emotion: EmotionLabel) -> EscalationOutcome {
        if !emotion.is_negative() {
            return EscalationOutcome::Ignored;
        }

        let streak = self.store.sad_streak().saturating_add(1);
        self.store.set_sad_streak(streak);

        if streak < self.settings.threshold {
            info!("Sad detection {streak}/{}", self.settings.threshold);
            return EscalationOutcome::Counted { streak };
        }

        if self.cancel_token.is_cancelled() {
            return EscalationOutcome::Suppressed { streak };
        }

        if self.settings.mode == EscalationMode::Once && self.latched.swap(true, Ordering::SeqCst) {
            return EscalationOutcome::Suppressed { streak };
        }

        self.schedule(streak);
        EscalationOutcome::Scheduled { streak }
    }

    fn schedule(&self, streak: u32) {
        let navigator = self.navigator.clone();
        let target = self.settings.target.clone();
        let delay = self.settings.delay();
        let token = self.cancel_token.clone();

        info!(
            "Sad streak {streak} reached threshold, navigating to {target} in {}ms",
            delay.as_millis()
        );

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Pending escalation to {target} cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    navigator.navigate(&target);
                }
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Escalations scheduled but not yet fired or cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Cancel every pending navigation and refuse new ones. Idempotent.
    pub fn cancel_pending(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        self.cancel_token.cancel();
        let handles = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !handles.is_empty() {
            info!("Cancelled {} pending escalation(s)", handles.len());
        }
    }
}
