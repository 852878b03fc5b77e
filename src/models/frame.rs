use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::EmotionLabel;

/// A single decoded video frame.
///
/// A stream that has not rendered its first frame yet hands out an empty
/// (0×0) frame rather than failing.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: RgbImage,
}

impl Frame {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn empty() -> Self {
        Self {
            pixels: RgbImage::new(0, 0),
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_decoded(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }
}

/// Face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What the presentation layer draws over the last classified frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub frame_width: u32,
    pub frame_height: u32,
    pub face: Option<FaceBox>,
    pub emotion: EmotionLabel,
}
