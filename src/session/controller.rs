use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::camera::{PermissionManager, PermissionStatus, VideoCaptureDevice};
use crate::classifier::{ClassifierFactory, ModelLifecycle, ModelStatus};
use crate::context::EmotionStore;
use crate::detection::{EscalationPolicy, InferenceController, TickContext};
use crate::error::DetectionError;
use crate::models::EmotionRecord;
use crate::navigation::Navigator;
use crate::settings::DetectionSettings;

use super::{DetectionState, SessionShared, SessionSnapshot};

pub const MODEL_LOADING_MESSAGE: &str = "Emotion detection model is still loading. Please wait...";
pub const MODEL_LOAD_FAILED_MESSAGE: &str =
    "Failed to load emotion models. Please refresh and try again.";

/// One detection session: owns the camera stream and the classifier
/// instance from `acquire` until `release` (or drop).
pub struct Session {
    id: String,
    settings: DetectionSettings,
    permission: Mutex<PermissionManager>,
    model: Arc<ModelLifecycle>,
    inference: Mutex<InferenceController>,
    escalation: Arc<EscalationPolicy>,
    store: Arc<dyn EmotionStore>,
    shared: Arc<SessionShared>,
    released: AtomicBool,
}

impl Session {
    pub fn new(
        camera: Arc<dyn VideoCaptureDevice>,
        factory: Arc<dyn ClassifierFactory>,
        store: Arc<dyn EmotionStore>,
        navigator: Arc<dyn Navigator>,
        settings: DetectionSettings,
    ) -> Result<Self> {
        settings
            .validate()
            .context("invalid detection settings")?;

        let escalation = Arc::new(EscalationPolicy::new(
            store.clone(),
            navigator,
            settings.escalation.clone(),
        ));
        let shared = Arc::new(SessionShared::new(settings.history_capacity));
        let session = Self {
            id: Uuid::new_v4().to_string(),
            permission: Mutex::new(PermissionManager::new(camera, settings.capture.clone())),
            model: Arc::new(ModelLifecycle::new(factory)),
            inference: Mutex::new(InferenceController::new()),
            escalation,
            store,
            shared,
            released: AtomicBool::new(false),
            settings,
        };
        info!("Detection session {} created", session.id);
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_released() {
            return Err(DetectionError::SessionReleased.into());
        }
        Ok(())
    }

    /// Ask for the camera and, once granted, load the model.
    pub async fn acquire(&self) -> Result<DetectionState> {
        self.ensure_active()?;
        if self.request_access().await? == PermissionStatus::Granted {
            self.load_model().await?;
        }
        Ok(self.state().await)
    }

    /// Explicit (re)try of camera acquisition.
    pub async fn request_access(&self) -> Result<PermissionStatus> {
        self.ensure_active()?;
        let mut manager = self.permission.lock().await;
        // `release` may have run while we waited for the lock.
        self.ensure_active()?;

        self.shared
            .update(|state| state.permission = PermissionStatus::Requesting)
            .await;
        let status = manager.request_access().await;
        self.shared
            .update(|state| {
                state.permission = status;
                if status == PermissionStatus::Granted {
                    state.detection_error = None;
                }
            })
            .await;

        Ok(status)
    }

    /// Start loading the model unless a load is in flight or finished.
    pub async fn load_model(&self) -> Result<ModelStatus> {
        self.ensure_active()?;

        let Some(pending) = self.model.begin_load() else {
            let status = self.model.status();
            self.publish_model_status(status.clone()).await;
            return Ok(status);
        };

        self.shared
            .update(|state| {
                state.model = ModelStatus::Loading;
                state.detection_error = None;
            })
            .await;

        let status = self.model.complete_load(pending).await;
        self.publish_model_status(status.clone()).await;
        Ok(status)
    }

    async fn publish_model_status(&self, status: ModelStatus) {
        self.shared
            .update(|state| {
                match status {
                    ModelStatus::Error(_) => {
                        state.detection_error = Some(MODEL_LOAD_FAILED_MESSAGE.to_string());
                    }
                    ModelStatus::Ready => state.detection_error = None,
                    _ => {}
                }
                state.model = status;
            })
            .await;
    }

    /// Dispose a failed model instance and load a fresh one. A model that is
    /// loading or ready is left as is.
    pub async fn reinitialize_model(&self) -> Result<ModelStatus> {
        self.ensure_active()?;
        if !self.model.reinitialize() {
            return Ok(self.model.status());
        }
        info!("Reinitialising emotion model for session {}", self.id);
        self.shared
            .update(|state| {
                state.model = ModelStatus::Unloaded;
                state.detection_error = None;
            })
            .await;
        self.load_model().await
    }

    /// Turn detection on. Without camera access this re-requests it; with
    /// the model not ready it records a message and does nothing else.
    pub async fn start_detection(&self) -> Result<DetectionState> {
        self.ensure_active()?;

        let permission = self.shared.read(|state| state.permission).await;
        if permission != PermissionStatus::Granted {
            let status = self.request_access().await?;
            if status != PermissionStatus::Granted {
                return Ok(self.state().await);
            }
        }

        let model_status = self.model.status();
        if !model_status.is_ready() {
            warn!("Start requested before the emotion model is ready ({model_status:?})");
            self.shared
                .update(|state| {
                    if !matches!(state.model, ModelStatus::Error(_)) {
                        state.detection_error = Some(MODEL_LOADING_MESSAGE.to_string());
                    }
                })
                .await;
            return Ok(self.state().await);
        }

        let mut inference = self.inference.lock().await;
        if inference.is_running() {
            return Ok(self.state().await);
        }

        let stream = {
            let manager = self.permission.lock().await;
            manager.stream().filter(|stream| stream.is_live())
        };
        let Some(stream) = stream else {
            warn!("No live camera stream for session {}", self.id);
            self.shared
                .update(|state| state.permission = PermissionStatus::Denied)
                .await;
            return Ok(self.state().await);
        };

        let ctx = TickContext {
            stream,
            model: self.model.clone(),
            shared: self.shared.clone(),
            store: self.store.clone(),
            escalation: self.escalation.clone(),
            classify_timeout: self.settings.classify_timeout(),
        };

        // Flip the flag before spawning so a tick can never land on a
        // not-detecting state.
        self.shared
            .update(|state| {
                state.is_detecting = true;
                state.detection_error = None;
            })
            .await;
        if let Err(err) = inference.start(ctx, self.settings.tick_interval()) {
            self.shared.update(|state| state.is_detecting = false).await;
            return Err(err);
        }

        info!("Detection started for session {}", self.id);
        Ok(self.state().await)
    }

    /// Cancel the loop and clear the overlay and any transient message.
    /// Scheduled escalations are left to fire.
    pub async fn stop_detection(&self) -> Result<()> {
        if self.is_released() {
            return Ok(());
        }

        let stopped = self.inference.lock().await.stop().await;
        self.shared
            .update(|state| {
                state.is_detecting = false;
                state.overlay = None;
                state.detection_error = None;
            })
            .await;

        match stopped {
            Ok(()) => {
                info!("Detection stopped for session {}", self.id);
                Ok(())
            }
            Err(err) => {
                error!("Inference loop for session {} did not stop cleanly: {err:?}", self.id);
                Err(err)
            }
        }
    }

    /// What the start/stop toggle does.
    pub async fn toggle_detection(&self) -> Result<DetectionState> {
        if self.shared.read(|state| state.is_detecting).await {
            self.stop_detection().await?;
            Ok(self.state().await)
        } else {
            self.start_detection().await
        }
    }

    /// Tear everything down: loop, pending escalations, classifier, then
    /// stream. Runs once; later calls return `false`.
    pub async fn release(&self) -> Result<bool> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let stopped = self.inference.lock().await.stop().await;
        if let Err(err) = &stopped {
            error!("Inference loop for session {} did not stop cleanly: {err:?}", self.id);
        }
        self.escalation.cancel_pending();
        self.model.dispose();
        self.permission.lock().await.release();

        self.shared
            .update(|state| {
                state.released = true;
                state.is_detecting = false;
                state.overlay = None;
                state.model = ModelStatus::Unloaded;
            })
            .await;

        info!("Detection session {} released", self.id);
        stopped.map(|_| true)
    }

    pub async fn state(&self) -> DetectionState {
        self.shared.read(|state| state.detection_state()).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot().await
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.subscribe()
    }

    /// Newest first, at most `history_capacity` entries.
    pub async fn history(&self) -> Vec<EmotionRecord> {
        self.shared.read(|state| state.history.to_vec()).await
    }

    pub async fn current_emotion(&self) -> Option<EmotionRecord> {
        self.shared.read(|state| state.current.clone()).await
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }

    pub fn sad_streak(&self) -> u32 {
        self.escalation.streak()
    }

    pub fn pending_escalations(&self) -> usize {
        self.escalation.pending_count()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("Detection session {} dropped without release", self.id);
        self.inference.get_mut().abort();
        self.escalation.cancel_pending();
        self.model.dispose();
        self.permission.get_mut().release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BackendOutput, ClassifierBackend};
    use crate::context::InMemoryEmotionStore;
    use crate::models::Frame;
    use crate::navigation::RecordingNavigator;
    use crate::simulated::{ScriptedBackend, ScriptedFactory, SimulatedCamera};
    use async_trait::async_trait;

    struct CrashingBackend;

    #[async_trait]
    impl ClassifierBackend for CrashingBackend {
        async fn initialize(&self) -> crate::error::Result<()> {
            Ok(())
        }

        async fn infer(&self, _frame: &Frame) -> crate::error::Result<BackendOutput> {
            panic!("backend crashed mid-inference");
        }

        fn dispose(&self) {}

        fn name(&self) -> &'static str {
            "crashing"
        }
    }

    struct CrashingFactory;

    impl ClassifierFactory for CrashingFactory {
        fn create(&self) -> crate::error::Result<Arc<dyn ClassifierBackend>> {
            Ok(Arc::new(CrashingBackend))
        }
    }

    fn session() -> (Arc<SimulatedCamera>, Arc<ScriptedBackend>, Session) {
        let camera = Arc::new(SimulatedCamera::new(64, 48));
        let backend = Arc::new(ScriptedBackend::new());
        let session = Session::new(
            camera.clone(),
            Arc::new(ScriptedFactory::new(backend.clone())),
            Arc::new(InMemoryEmotionStore::new()),
            Arc::new(RecordingNavigator::new()),
            DetectionSettings::default(),
        )
        .unwrap();
        (camera, backend, session)
    }

    #[tokio::test]
    async fn acquire_walks_to_model_ready() {
        let (_, _, session) = session();
        let mut rx = session.subscribe();
        assert_eq!(session.state().await, DetectionState::Idle);

        assert_eq!(session.acquire().await.unwrap(), DetectionState::ModelReady);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, DetectionState::ModelReady);
    }

    #[tokio::test]
    async fn operations_after_release_are_rejected() {
        let (_, _, session) = session();
        session.acquire().await.unwrap();
        assert!(session.release().await.unwrap());

        let err = session.start_detection().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<DetectionError>(),
            Some(&DetectionError::SessionReleased)
        );
        assert!(session.stop_detection().await.is_ok());
        assert_eq!(session.state().await, DetectionState::Unmounted);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_tears_down_without_release() {
        let (camera, backend, session) = session();
        session.acquire().await.unwrap();
        session.start_detection().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        drop(session);
        assert_eq!(camera.stop_count(), 1);
        assert_eq!(backend.dispose_count(), 1);

        let calls = backend.infer_count();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(backend.infer_count(), calls);
    }

    #[tokio::test]
    async fn drop_after_release_is_a_no_op() {
        let (camera, backend, session) = session();
        session.acquire().await.unwrap();
        session.release().await.unwrap();
        drop(session);
        assert_eq!(camera.stop_count(), 1);
        assert_eq!(backend.dispose_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_starts_then_stops() {
        let (_, _, session) = session();
        session.acquire().await.unwrap();

        assert_eq!(session.toggle_detection().await.unwrap(), DetectionState::Detecting);
        assert_eq!(session.snapshot().await.control_label(), "Stop Detection");
        assert_eq!(session.toggle_detection().await.unwrap(), DetectionState::ModelReady);
        assert_eq!(session.snapshot().await.control_label(), "Start Face Detection");
    }

    #[test]
    fn zero_tick_interval_is_rejected_at_construction() {
        let mut settings = DetectionSettings::default();
        settings.tick_interval_ms = 0;

        let result = Session::new(
            Arc::new(SimulatedCamera::new(64, 48)),
            Arc::new(ScriptedFactory::new(Arc::new(ScriptedBackend::new()))),
            Arc::new(InMemoryEmotionStore::new()),
            Arc::new(RecordingNavigator::new()),
            settings,
        );
        let err = result.err().expect("zero interval must be refused");
        assert!(format!("{err:#}").contains("tickIntervalMs"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_detecting_even_when_loop_crashed() {
        let camera = Arc::new(SimulatedCamera::new(64, 48));
        let session = Session::new(
            camera.clone(),
            Arc::new(CrashingFactory),
            Arc::new(InMemoryEmotionStore::new()),
            Arc::new(RecordingNavigator::new()),
            DetectionSettings::default(),
        )
        .unwrap();
        session.acquire().await.unwrap();
        assert_eq!(session.start_detection().await.unwrap(), DetectionState::Detecting);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(session.stop_detection().await.is_err());
        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_detecting);
        assert!(snapshot.overlay.is_none());
        assert_eq!(snapshot.state, DetectionState::ModelReady);

        // The crashed loop has been reaped; teardown still completes.
        assert!(session.release().await.unwrap());
        assert_eq!(camera.stop_count(), 1);
    }
}
