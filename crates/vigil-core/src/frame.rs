//! Decoded video frames and the source trait that produces them.

use image::{imageops, DynamicImage, GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A decoded colour frame.
///
/// The luma plane is derived once at construction for the detector and
/// landmark models; the recognizer reads the colour planes.
#[derive(Clone)]
pub struct Frame {
    rgb: RgbImage,
    luma: GrayImage,
    /// Zero-based position in the decoded sequence.
    pub sequence: usize,
}

impl Frame {
    pub fn new(rgb: RgbImage, sequence: usize) -> Self {
        let luma = imageops::grayscale(&rgb);
        Self { rgb, luma, sequence }
    }

    pub fn from_dynamic(image: &DynamicImage, sequence: usize) -> Self {
        Self::new(image.to_rgb8(), sequence)
    }

    /// Load a still image from disk as a single frame.
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let img = image::open(path)?;
        Ok(Self::from_dynamic(&img, 0))
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot decode video {path}: {message}")]
    Video { path: PathBuf, message: String },
    #[error("unsupported video input: {0}")]
    Unsupported(String),
    #[error("video input is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

/// Supplies the complete, ordered frame sequence of one video.
///
/// Sources are read once and fully buffered; there is no streaming access.
pub trait FrameSource {
    fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError>;
}

/// An already-decoded frame sequence.
impl FrameSource for Vec<Frame> {
    fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError> {
        Ok(std::mem::take(self))
    }
}
