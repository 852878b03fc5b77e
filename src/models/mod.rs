mod emotion;
mod frame;

pub use emotion::{EmotionLabel, EmotionRecord, EmotionScores};
pub use frame::{FaceBox, Frame, Overlay};
