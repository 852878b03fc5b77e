//! In-process stand-ins for the camera and the classifier backend.
//!
//! The demo runs on [`SimulatedCamera`] + [`SyntheticBlendshapeFactory`];
//! tests drive the session deterministically with [`ScriptedBackend`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::camera::{VideoCaptureDevice, VideoStream};
use crate::classifier::blendshape::score_emotions;
use crate::classifier::{BackendOutput, ClassifierBackend, ClassifierFactory};
use crate::error::{DetectionError, Result};
use crate::models::{EmotionLabel, EmotionScores, FaceBox, Frame};
use crate::settings::CaptureConstraints;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Camera that grants (or refuses) access and serves flat grey frames.
pub struct SimulatedCamera {
    allow: AtomicBool,
    frame_size: Arc<Mutex<(u32, u32)>>,
    acquire_delay: Mutex<Duration>,
    acquire_count: AtomicUsize,
    stop_count: Arc<AtomicUsize>,
    last_stream: Mutex<Option<Arc<SimulatedStream>>>,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            allow: AtomicBool::new(true),
            frame_size: Arc::new(Mutex::new((width, height))),
            acquire_delay: Mutex::new(Duration::ZERO),
            acquire_count: AtomicUsize::new(0),
            stop_count: Arc::new(AtomicUsize::new(0)),
            last_stream: Mutex::new(None),
        }
    }

    /// Refuses every request until `set_allow(true)`.
    pub fn denying() -> Self {
        let camera = Self::new(640, 480);
        camera.set_allow(false);
        camera
    }

    pub fn set_allow(&self, allow: bool) {
        self.allow.store(allow, Ordering::SeqCst);
    }

    /// Applies to streams already handed out as well. `(0, 0)` simulates a
    /// stream that has not rendered a frame yet.
    pub fn set_frame_size(&self, width: u32, height: u32) {
        *lock(&self.frame_size) = (width, height);
    }

    /// How long the permission prompt stays open before it resolves.
    pub fn set_acquire_delay(&self, delay: Duration) {
        *lock(&self.acquire_delay) = delay;
    }

    /// The device ends the most recent stream on its own.
    pub fn end_stream(&self) {
        if let Some(stream) = lock(&self.last_stream).as_ref() {
            stream.live.store(false, Ordering::SeqCst);
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    /// Number of distinct streams that have been stopped.
    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoCaptureDevice for SimulatedCamera {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Arc<dyn VideoStream>> {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.acquire_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.allow.load(Ordering::SeqCst) {
            return Err(DetectionError::PermissionDenied(
                "user dismissed the camera prompt".into(),
            ));
        }

        debug!(
            "simulated camera opened ({}x{} requested)",
            constraints.ideal_width, constraints.ideal_height
        );
        let stream = Arc::new(SimulatedStream {
            frame_size: self.frame_size.clone(),
            live: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            stop_count: self.stop_count.clone(),
        });
        *lock(&self.last_stream) = Some(stream.clone());
        Ok(stream)
    }
}

pub struct SimulatedStream {
    frame_size: Arc<Mutex<(u32, u32)>>,
    live: AtomicBool,
    stopped: AtomicBool,
    stop_count: Arc<AtomicUsize>,
}

impl VideoStream for SimulatedStream {
    fn latest_frame(&self) -> Frame {
        let (width, height) = *lock(&self.frame_size);
        Frame::new(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Backend that replays queued results, then repeats a fallback.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<BackendOutput>>>,
    fallback: Mutex<Result<BackendOutput>>,
    init_failure: Mutex<Option<String>>,
    init_delay: Mutex<Duration>,
    infer_delay: Mutex<Duration>,
    init_count: AtomicUsize,
    infer_count: AtomicUsize,
    dispose_count: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let neutral: EmotionScores = [(EmotionLabel::Neutral, 0.9)].into_iter().collect();
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(BackendOutput {
                scores: neutral,
                face: None,
            })),
            init_failure: Mutex::new(None),
            init_delay: Mutex::new(Duration::ZERO),
            infer_delay: Mutex::new(Duration::ZERO),
            init_count: AtomicUsize::new(0),
            infer_count: AtomicUsize::new(0),
            dispose_count: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<BackendOutput>) {
        lock(&self.script).push_back(result);
    }

    pub fn push_scores(&self, scores: EmotionScores) {
        self.push(Ok(BackendOutput { scores, face: None }));
    }

    /// Queue a result whose top label is `emotion` at `score`.
    pub fn push_emotion(&self, emotion: EmotionLabel, score: f32) {
        self.push_scores([(emotion, score)].into_iter().collect());
    }

    /// Returned once the script runs dry.
    pub fn set_fallback(&self, result: Result<BackendOutput>) {
        *lock(&self.fallback) = result;
    }

    pub fn fail_initialize(&self, message: &str) {
        *lock(&self.init_failure) = Some(message.to_string());
    }

    pub fn succeed_initialize(&self) {
        *lock(&self.init_failure) = None;
    }

    pub fn set_init_delay(&self, delay: Duration) {
        *lock(&self.init_delay) = delay;
    }

    pub fn set_infer_delay(&self, delay: Duration) {
        *lock(&self.infer_delay) = delay;
    }

    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn infer_count(&self) -> usize {
        self.infer_count.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierBackend for ScriptedBackend {
    async fn initialize(&self) -> Result<()> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.init_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.init_failure).clone() {
            Some(message) => Err(DetectionError::ModelLoad(message)),
            None => Ok(()),
        }
    }

    async fn infer(&self, _frame: &Frame) -> Result<BackendOutput> {
        self.infer_count.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.infer_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| lock(&self.fallback).clone())
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Hands out one shared [`ScriptedBackend`], or always fails.
pub struct ScriptedFactory {
    backend: Option<Arc<ScriptedBackend>>,
    failure: Option<String>,
}

impl ScriptedFactory {
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self {
            backend: Some(backend),
            failure: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            backend: None,
            failure: Some(message.to_string()),
        }
    }
}

impl ClassifierFactory for ScriptedFactory {
    fn create(&self) -> Result<Arc<dyn ClassifierBackend>> {
        match (&self.backend, &self.failure) {
            (Some(backend), None) => Ok(backend.clone()),
            (_, Some(message)) => Err(DetectionError::ModelLoad(message.clone())),
            (None, None) => Err(DetectionError::ModelLoad("no backend configured".into())),
        }
    }
}

const EXPRESSIONS: [&[&str]; 6] = [
    &["mouthSmileLeft", "mouthSmileRight", "cheekSquintLeft", "cheekSquintRight"],
    &["mouthFrownLeft", "mouthFrownRight", "browInnerUp", "mouthPucker"],
    &["browDownLeft", "browDownRight", "mouthPressLeft", "mouthPressRight"],
    &["eyeWideLeft", "eyeWideRight", "browOuterUpLeft", "browOuterUpRight", "jawOpen"],
    &["eyeWideLeft", "eyeWideRight", "browInnerUp", "mouthStretchLeft", "mouthStretchRight"],
    &["noseSneerLeft", "noseSneerRight", "mouthUpperUpLeft", "mouthUpperUpRight"],
];

/// Generates plausible blendshape coefficients and scores them with
/// [`score_emotions`]. Roughly one frame in ten has no face.
pub struct SyntheticBlendshapeBackend {
    rng: Mutex<StdRng>,
    warmup: Duration,
}

impl SyntheticBlendshapeBackend {
    pub fn new(warmup: Duration) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            warmup,
        }
    }

    pub fn seeded(seed: u64, warmup: Duration) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            warmup,
        }
    }

    fn sample(&self, frame: &Frame) -> Option<(HashMap<String, f32>, FaceBox)> {
        let mut rng = lock(&self.rng);
        if rng.gen_bool(0.1) {
            return None;
        }

        let mut blendshapes = HashMap::new();
        for names in EXPRESSIONS {
            for name in names.iter() {
                blendshapes.insert(name.to_string(), rng.gen_range(0.0..0.15));
            }
        }
        if rng.gen_bool(0.6) {
            let names = EXPRESSIONS[rng.gen_range(0..EXPRESSIONS.len())];
            let intensity: f32 = rng.gen_range(0.4..1.0);
            for name in names.iter() {
                blendshapes.insert(name.to_string(), intensity);
            }
        }

        let width = frame.width() / 2;
        let height = frame.height() / 2;
        let face = FaceBox {
            x: (frame.width() - width) / 2,
            y: (frame.height() - height) / 2,
            width,
            height,
        };
        Some((blendshapes, face))
    }
}

#[async_trait]
impl ClassifierBackend for SyntheticBlendshapeBackend {
    async fn initialize(&self) -> Result<()> {
        tokio::time::sleep(self.warmup).await;
        info!("Synthetic face landmarker warmed up");
        Ok(())
    }

    async fn infer(&self, frame: &Frame) -> Result<BackendOutput> {
        let (blendshapes, face) = self
            .sample(frame)
            .ok_or_else(|| DetectionError::Inference("no face detected".into()))?;
        Ok(BackendOutput {
            scores: score_emotions(&blendshapes),
            face: Some(face),
        })
    }

    fn dispose(&self) {
        debug!("Synthetic face landmarker released");
    }

    fn name(&self) -> &'static str {
        "synthetic-blendshape"
    }
}

pub struct SyntheticBlendshapeFactory {
    warmup: Duration,
}

impl SyntheticBlendshapeFactory {
    pub fn new(warmup: Duration) -> Self {
        Self { warmup }
    }
}

impl ClassifierFactory for SyntheticBlendshapeFactory {
    fn create(&self) -> Result<Arc<dyn ClassifierBackend>> {
        Ok(Arc::new(SyntheticBlendshapeBackend::new(self.warmup)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_follows_frame_size_and_ends() {
        let camera = SimulatedCamera::new(4, 3);
        let stream = camera.acquire(&CaptureConstraints::default()).await.unwrap();
        assert_eq!(stream.latest_frame().width(), 4);

        camera.set_frame_size(0, 0);
        assert!(!stream.latest_frame().is_decoded());

        camera.end_stream();
        assert!(!stream.is_live());
        assert_eq!(camera.stop_count(), 0);
    }

    #[tokio::test]
    async fn stopping_twice_counts_once() {
        let camera = SimulatedCamera::new(4, 3);
        let stream = camera.acquire(&CaptureConstraints::default()).await.unwrap();
        stream.stop();
        stream.stop();
        assert_eq!(camera.stop_count(), 1);
    }

    #[tokio::test]
    async fn scripted_backend_replays_then_falls_back() {
        let backend = ScriptedBackend::new();
        backend.push_emotion(EmotionLabel::Sad, 0.8);
        let frame = Frame::from_raw(1, 1, vec![0; 3]).unwrap();

        let first = backend.infer(&frame).await.unwrap();
        assert_eq!(first.scores.top().map(|(label, _)| label), Some(EmotionLabel::Sad));
        let second = backend.infer(&frame).await.unwrap();
        assert_eq!(second.scores.top().map(|(label, _)| label), Some(EmotionLabel::Neutral));
        assert_eq!(backend.infer_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_backend_scores_every_label() {
        let backend = SyntheticBlendshapeBackend::seeded(7, Duration::from_millis(10));
        backend.initialize().await.unwrap();
        let frame = Frame::from_raw(8, 8, vec![0; 192]).unwrap();

        let mut scored = 0;
        for _ in 0..20 {
            if let Ok(output) = backend.infer(&frame).await {
                assert_eq!(output.scores.len(), EmotionLabel::ALL.len());
                assert_eq!(output.face.map(|face| face.width), Some(4));
                scored += 1;
            }
        }
        assert!(scored > 0);
    }
}
