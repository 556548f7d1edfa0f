//! Video containers (MP4, AVI, WebM, ...) decoded through OpenCV.

use image::RgbImage;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use std::path::PathBuf;
use vigil_core::{Frame, FrameSource, FrameSourceError};

/// Every frame of a video file, in playback order.
pub struct VideoFile {
    path: PathBuf,
    max_bytes: u64,
}

impl VideoFile {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    fn error(&self, message: impl ToString) -> FrameSourceError {
        FrameSourceError::Video {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    /// Decoded BGR (or gray/BGRA) capture frame → RGB image.
    fn to_rgb(&self, mat: &Mat) -> Result<RgbImage, FrameSourceError> {
        let code = match mat.channels() {
            1 => imgproc::COLOR_GRAY2RGB,
            3 => imgproc::COLOR_BGR2RGB,
            4 => imgproc::COLOR_BGRA2RGB,
            n => return Err(self.error(format!("unsupported frame with {n} channels"))),
        };

        let mut rgb = Mat::default();
        imgproc::cvt_color(mat, &mut rgb, code, 0).map_err(|e| self.error(e))?;

        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes().map_err(|e| self.error(e))?.to_vec();
        RgbImage::from_raw(width, height, bytes)
            .ok_or_else(|| self.error(format!("frame buffer does not match {width}x{height}")))
    }
}

impl FrameSource for VideoFile {
    fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError> {
        let size = crate::file_size(&self.path)?;
        if size > self.max_bytes {
            return Err(FrameSourceError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let name = self
            .path
            .to_str()
            .ok_or_else(|| self.error("path is not valid UTF-8"))?;
        let mut cap = VideoCapture::from_file(name, videoio::CAP_ANY).map_err(|e| self.error(e))?;
        if !cap.is_opened().map_err(|e| self.error(e))? {
            return Err(self.error("no backend could open the file"));
        }

        let mut frames = Vec::new();
        let mut mat = Mat::default();
        while cap.read(&mut mat).map_err(|e| self.error(e))? {
            if mat.empty() {
                break;
            }
            let sequence = frames.len();
            frames.push(Frame::new(self.to_rgb(&mat)?, sequence));
        }
        // Some backends open unreadable files and then yield nothing.
        if frames.is_empty() {
            return Err(self.error("no frames could be decoded"));
        }

        tracing::debug!(path = %self.path.display(), frames = frames.len(), bytes = size, "decoded video");
        Ok(frames)
    }
}
