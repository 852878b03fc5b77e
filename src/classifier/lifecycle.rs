use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::{ClassifierBackend, ClassifierFactory, EmotionClassifier};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum ModelStatus {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Error(String),
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelStatus::Ready)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ModelStatus::Loading)
    }
}

/// A load that has been started but not yet awaited.
pub struct PendingLoad {
    backend: Arc<dyn ClassifierBackend>,
    generation: u64,
}

struct ModelSlot {
    status: ModelStatus,
    backend: Option<Arc<dyn ClassifierBackend>>,
    /// Bumped by `reinitialize` so a load that finishes late is ignored.
    generation: u64,
    disposed: bool,
}

/// Owns the classifier backend instance from creation to disposal.
pub struct ModelLifecycle {
    factory: Arc<dyn ClassifierFactory>,
    slot: Mutex<ModelSlot>,
}

impl ModelLifecycle {
    pub fn new(factory: Arc<dyn ClassifierFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(ModelSlot {
                status: ModelStatus::Unloaded,
                backend: None,
                generation: 0,
                disposed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModelSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ModelStatus {
        self.lock().status.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Classifier view, only while the backend is ready.
    pub fn classifier(&self) -> Option<EmotionClassifier> {
        let slot = self.lock();
        match (&slot.status, &slot.backend) {
            (ModelStatus::Ready, Some(backend)) => Some(EmotionClassifier::new(backend.clone())),
            _ => None,
        }
    }

    /// Create the backend and mark the model as loading.
    ///
    /// Returns `None` when a load is already in flight, has completed (either
    /// way), or the lifecycle has been disposed.
    pub fn begin_load(&self) -> Option<PendingLoad> {
        let mut slot = self.lock();
        if slot.disposed || slot.status != ModelStatus::Unloaded {
            return None;
        }

        match self.factory.create() {
            Ok(backend) => {
                info!("Loading emotion model ({})", backend.name());
                slot.status = ModelStatus::Loading;
                slot.backend = Some(backend.clone());
                Some(PendingLoad {
                    backend,
                    generation: slot.generation,
                })
            }
            Err(err) => {
                error!("Failed to create emotion classifier: {err}");
                slot.status = ModelStatus::Error(err.to_string());
                None
            }
        }
    }

    /// Await the backend's initialisation and record the outcome.
    pub async fn complete_load(&self, pending: PendingLoad) -> ModelStatus {
        let result = pending.backend.initialize().await;

        let mut slot = self.lock();
        if slot.disposed || slot.generation != pending.generation {
            warn!("Emotion model finished loading after it was discarded");
            return slot.status.clone();
        }

        slot.status = match result {
            Ok(()) => {
                info!("Emotion model ready ({})", pending.backend.name());
                ModelStatus::Ready
            }
            Err(err) => {
                error!("Error initializing emotion model: {err}");
                ModelStatus::Error(err.to_string())
            }
        };
        slot.status.clone()
    }

    /// Idempotent: a no-op returning the current status if a load is in
    /// flight or already finished.
    pub async fn ensure_ready(&self) -> ModelStatus {
        match self.begin_load() {
            Some(pending) => self.complete_load(pending).await,
            None => self.status(),
        }
    }

    /// Throw away a failed instance so the next `ensure_ready` starts from
    /// scratch. Only acts in the `Error` state; a loading or ready backend
    /// may be in use and is left alone. Returns whether a reset happened.
    pub fn reinitialize(&self) -> bool {
        let mut slot = self.lock();
        if slot.disposed || !matches!(slot.status, ModelStatus::Error(_)) {
            return false;
        }
        if let Some(backend) = slot.backend.take() {
            backend.dispose();
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.status = ModelStatus::Unloaded;
        info!("Emotion model reset for reinitialisation");
        true
    }

    /// Dispose the instance, ready or not. Terminal; safe to call repeatedly.
    /// Returns whether an instance was disposed by this call.
    pub fn dispose(&self) -> bool {
        let mut slot = self.lock();
        slot.disposed = true;
        slot.status = ModelStatus::Unloaded;
        match slot.backend.take() {
            Some(backend) => {
                backend.dispose();
                info!("Emotion model disposed ({})", backend.name());
                true
            }
            None => false,
        }
    }
}

impl Drop for ModelLifecycle {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::simulated::{ScriptedBackend, ScriptedFactory};

    fn lifecycle() -> (Arc<ScriptedBackend>, ModelLifecycle) {
        let backend = Arc::new(ScriptedBackend::new());
        let factory = Arc::new(ScriptedFactory::new(backend.clone()));
        (backend, ModelLifecycle::new(factory))
    }

    #[tokio::test]
    async fn ensure_ready_loads_once() {
        let (backend, model) = lifecycle();
        assert_eq!(model.status(), ModelStatus::Unloaded);
        assert!(model.classifier().is_none());

        assert_eq!(model.ensure_ready().await, ModelStatus::Ready);
        assert_eq!(model.ensure_ready().await, ModelStatus::Ready);
        assert_eq!(backend.init_count(), 1);
        assert!(model.classifier().is_some());
    }

    #[tokio::test]
    async fn second_caller_during_load_is_a_no_op() {
        let (backend, model) = lifecycle();
        let pending = model.begin_load().unwrap();
        assert_eq!(model.status(), ModelStatus::Loading);

        assert_eq!(model.ensure_ready().await, ModelStatus::Loading);
        assert!(model.begin_load().is_none());

        assert_eq!(model.complete_load(pending).await, ModelStatus::Ready);
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_not_retried() {
        let (backend, model) = lifecycle();
        backend.fail_initialize("weights missing");

        let status = model.ensure_ready().await;
        assert!(matches!(status, ModelStatus::Error(ref msg) if msg.contains("weights missing")));
        assert!(model.classifier().is_none());

        model.ensure_ready().await;
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn reinitialize_allows_a_fresh_load() {
        let (backend, model) = lifecycle();
        backend.fail_initialize("flaky");
        model.ensure_ready().await;

        backend.succeed_initialize();
        assert!(model.reinitialize());
        assert_eq!(backend.dispose_count(), 1);
        assert_eq!(model.ensure_ready().await, ModelStatus::Ready);
        assert_eq!(backend.init_count(), 2);
    }

    #[tokio::test]
    async fn reinitialize_leaves_loading_and_ready_models_alone() {
        let (backend, model) = lifecycle();
        assert!(!model.reinitialize());

        let pending = model.begin_load().unwrap();
        assert!(!model.reinitialize());
        assert_eq!(model.complete_load(pending).await, ModelStatus::Ready);

        assert!(!model.reinitialize());
        assert_eq!(model.status(), ModelStatus::Ready);
        assert!(model.classifier().is_some());
        assert_eq!(backend.dispose_count(), 0);
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn factory_error_becomes_error_status() {
        let factory = Arc::new(ScriptedFactory::failing("no runtime"));
        let model = ModelLifecycle::new(factory);
        let status = model.ensure_ready().await;
        assert_eq!(
            status,
            ModelStatus::Error(DetectionError::ModelLoad("no runtime".into()).to_string())
        );
    }

    #[tokio::test]
    async fn dispose_runs_once_even_if_never_ready() {
        let (backend, model) = lifecycle();
        let pending = model.begin_load().unwrap();

        assert!(model.dispose());
        assert!(!model.dispose());
        assert_eq!(backend.dispose_count(), 1);

        // A load completing after teardown must not resurrect the model.
        assert_eq!(model.complete_load(pending).await, ModelStatus::Unloaded);
        assert!(model.classifier().is_none());
        assert!(model.begin_load().is_none());
    }

    #[tokio::test]
    async fn drop_disposes_exactly_once() {
        let (backend, model) = lifecycle();
        model.ensure_ready().await;
        model.dispose();
        drop(model);
        assert_eq!(backend.dispose_count(), 1);
    }

    #[test]
    fn status_serialises_with_tag() {
        let json = serde_json::to_string(&ModelStatus::Error("boom".into())).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"boom"}"#);
        let json = serde_json::to_string(&ModelStatus::Ready).unwrap();
        assert_eq!(json, r#"{"status":"ready"}"#);
    }
}
