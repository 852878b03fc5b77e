use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{inference_loop, TickContext};

/// Starts and stops the periodic inference task.
pub struct InferenceController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl InferenceController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    /// True while the loop task is alive. A loop that ended on its own
    /// (stream lost) reads as not running.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self, ctx: TickContext, period: Duration) -> Result<()> {
        if self.is_running() {
            bail!("inference already active");
        }
        // Reap a loop that exited by itself.
        self.handle = None;
        self.cancel_token = None;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(inference_loop(ctx, period, cancel_token.clone()));

        info!("Inference loop started ({}ms period)", period.as_millis());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel the loop and wait for it to exit. Once this returns no further
    /// classification starts. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("inference loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Synchronous teardown for `Drop`: cancel and abort without waiting.
    pub fn abort(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Default for InferenceController {
    fn default() -> Self {
        Self::new()
    }
}
