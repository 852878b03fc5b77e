use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::VideoStream;
use crate::classifier::ModelLifecycle;
use crate::context::EmotionStore;
use crate::error::DetectionError;
use crate::models::{EmotionRecord, Overlay};
use crate::session::SessionShared;

use super::escalation::{EscalationOutcome, EscalationPolicy};

pub const INFERENCE_ERROR_MESSAGE: &str = "Error during emotion detection. Please try again.";
pub const STREAM_LOST_MESSAGE: &str = "Camera stream ended. Please allow camera access again.";

/// Everything one tick touches.
#[derive(Clone)]
pub struct TickContext {
    pub stream: Arc<dyn VideoStream>,
    pub model: Arc<ModelLifecycle>,
    pub shared: Arc<SessionShared>,
    pub store: Arc<dyn EmotionStore>,
    pub escalation: Arc<EscalationPolicy>,
    pub classify_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FrameNotReady,
    ModelNotReady,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Recorded {
        record: EmotionRecord,
        escalation: EscalationOutcome,
    },
    Failed(DetectionError),
    StreamLost,
    Cancelled,
}

fn verbose_ticks() -> bool {
    std::env::var("MOODSENSE_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Runs until cancelled or the camera stream dies. The first tick fires
/// immediately; ticks never overlap, and one that comes due while the
/// previous is still classifying is dropped.
pub async fn inference_loop(ctx: TickContext, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let verbose = verbose_ticks();

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("inference loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                let outcome = perform_tick(&ctx, &cancel_token).await;
                if started.elapsed() >= period {
                    // Overran: drop the tick that came due meanwhile.
                    ticker.reset();
                }
                match outcome {
                    TickOutcome::Recorded { record, escalation } => {
                        if verbose {
                            info!("tick: {record} ({escalation:?})");
                        } else {
                            debug!("tick: {record} ({escalation:?})");
                        }
                    }
                    TickOutcome::Skipped(reason) => debug!("tick skipped: {reason:?}"),
                    TickOutcome::Failed(err) => warn!("emotion detection failed: {err}"),
                    TickOutcome::StreamLost => {
                        warn!("camera stream closed by the device, stopping detection");
                        ctx.shared
                            .update(|state| state.on_stream_lost(STREAM_LOST_MESSAGE))
                            .await;
                        break;
                    }
                    TickOutcome::Cancelled => {
                        info!("inference loop cancelled mid-tick");
                        break;
                    }
                }
            }
        }
    }
}

/// One classification step. Only the classification itself races the
/// cancellation token; once a result is in hand it is published in full.
pub async fn perform_tick(ctx: &TickContext, cancel_token: &CancellationToken) -> TickOutcome {
    if !ctx.stream.is_live() {
        return TickOutcome::StreamLost;
    }

    let Some(classifier) = ctx.model.classifier() else {
        return TickOutcome::Skipped(SkipReason::ModelNotReady);
    };

    let frame = ctx.stream.latest_frame();
    if !frame.is_decoded() {
        return TickOutcome::Skipped(SkipReason::FrameNotReady);
    }

    let classified = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return TickOutcome::Cancelled,
        result = tokio::time::timeout(ctx.classify_timeout, classifier.classify(&frame)) => result,
    };

    let classification = match classified {
        Ok(Ok(classification)) => classification,
        Ok(Err(DetectionError::InvalidFrame { .. })) => {
            return TickOutcome::Skipped(SkipReason::FrameNotReady);
        }
        Ok(Err(err)) => return record_failure(ctx, err).await,
        Err(_) => {
            let err = DetectionError::Inference(format!(
                "classification timed out after {}ms",
                ctx.classify_timeout.as_millis()
            ));
            return record_failure(ctx, err).await;
        }
    };

    let record = EmotionRecord::new(
        classification.emotion,
        classification.confidence,
        classification.all_scores,
    );
    let overlay = Overlay {
        frame_width: frame.width(),
        frame_height: frame.height(),
        face: classification.face,
        emotion: record.emotion,
    };

    ctx.store.set_current_emotion(&record);
    ctx.store.append_emotion_history(&record);
    let escalation = ctx.escalation.on_detection(record.emotion);
    let streak = ctx.store.sad_streak();

    ctx.shared
        .update(|state| state.on_record(record.clone(), overlay, streak))
        .await;

    TickOutcome::Recorded { record, escalation }
}

async fn record_failure(ctx: &TickContext, err: DetectionError) -> TickOutcome {
    ctx.shared
        .update(|state| state.detection_error = Some(INFERENCE_ERROR_MESSAGE.to_string()))
        .await;
    TickOutcome::Failed(err)
}
