pub mod camera;
pub mod classifier;
pub mod context;
pub mod detection;
pub mod error;
pub mod models;
pub mod navigation;
pub mod session;
pub mod settings;
pub mod simulated;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{error, info, warn};

use context::InMemoryEmotionStore;
use navigation::RecordingNavigator;
use session::{DetectionState, Session};
use settings::{DetectionSettings, SettingsStore};
use simulated::{SimulatedCamera, SyntheticBlendshapeFactory};

const DEMO_DURATION: Duration = Duration::from_secs(6);
const DEMO_MODEL_WARMUP: Duration = Duration::from_millis(300);

fn load_settings() -> Result<DetectionSettings> {
    match std::env::var_os("MOODSENSE_SETTINGS") {
        Some(path) => {
            let store = SettingsStore::new(PathBuf::from(path))?;
            Ok(store.detection())
        }
        None => Ok(DetectionSettings::default()),
    }
}

async fn run_demo_session(settings: DetectionSettings) -> Result<()> {
    let camera = Arc::new(SimulatedCamera::new(
        settings.capture.ideal_width,
        settings.capture.ideal_height,
    ));
    let store = Arc::new(InMemoryEmotionStore::new());
    let navigator = Arc::new(RecordingNavigator::new());
    let session = Session::new(
        camera,
        Arc::new(SyntheticBlendshapeFactory::new(DEMO_MODEL_WARMUP)),
        store.clone(),
        navigator.clone(),
        settings,
    )?;

    let state = session.acquire().await?;
    if state != DetectionState::ModelReady {
        warn!("Session not ready for detection: {}", state.description());
        session.release().await?;
        return Ok(());
    }

    let mut updates = session.subscribe();
    session.start_detection().await?;

    let deadline = tokio::time::Instant::now() + DEMO_DURATION;
    while let Ok(Ok(())) = tokio::time::timeout_at(deadline, updates.changed()).await {
        let snapshot = updates.borrow_and_update().clone();
        if let Some(current) = &snapshot.current {
            info!("{} | streak {}", current, snapshot.sad_streak);
        }
        if let Some(message) = snapshot.escalation_message() {
            info!("{message}");
        }
        if let Some(message) = &snapshot.detection_error {
            warn!("{message}");
        }
    }

    session.stop_detection().await?;
    for record in session.history().await {
        info!("history: {record}");
    }
    info!(
        "{} detections stored, {} navigation(s)",
        store.emotion_history().len(),
        navigator.count()
    );

    session.release().await?;
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("MoodSense starting up...");

    let result = (|| -> Result<()> {
        let settings = load_settings()?;
        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        runtime.block_on(run_demo_session(settings))
    })();

    if let Err(err) = result {
        error!("MoodSense demo failed: {err:?}");
    }
}
