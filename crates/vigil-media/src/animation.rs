//! Animated GIF decoding.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use vigil_core::{Frame, FrameSource, FrameSourceError};

/// Every frame of a GIF animation, composited, in playback order.
pub struct GifAnimation {
    path: PathBuf,
    max_bytes: u64,
}

impl GifAnimation {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }
}

impl FrameSource for GifAnimation {
    fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError> {
        let size = crate::file_size(&self.path)?;
        if size > self.max_bytes {
            return Err(FrameSourceError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let file = File::open(&self.path).map_err(|source| FrameSourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let decode_err = |source| FrameSourceError::Decode {
            path: self.path.clone(),
            source,
        };
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(decode_err)?;

        let mut frames = Vec::new();
        for (sequence, frame) in decoder.into_frames().enumerate() {
            let rgba = frame.map_err(decode_err)?.into_buffer();
            frames.push(Frame::from_dynamic(&DynamicImage::ImageRgba8(rgba), sequence));
        }

        tracing::debug!(path = %self.path.display(), frames = frames.len(), bytes = size, "decoded GIF");
        Ok(frames)
    }
}
