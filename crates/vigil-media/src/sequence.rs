//! A directory of still images played back as a video.

use std::path::{Path, PathBuf};
use vigil_core::{Frame, FrameSource, FrameSourceError};

/// File extensions accepted as frames, compared case-insensitively.
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff"];

/// Frames are the directory's image files in file-name order.
pub struct ImageSequence {
    dir: PathBuf,
    max_bytes: u64,
}

impl ImageSequence {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Paths of the frame files, sorted by file name.
    pub fn frame_paths(&self) -> Result<Vec<PathBuf>, FrameSourceError> {
        let io_err = |source| FrameSourceError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

impl FrameSource for ImageSequence {
    fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError> {
        let paths = self.frame_paths()?;

        let mut size = 0u64;
        for path in &paths {
            size += crate::file_size(path)?;
        }
        if size > self.max_bytes {
            return Err(FrameSourceError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        tracing::debug!(dir = %self.dir.display(), files = paths.len(), bytes = size, "decoding image sequence");

        paths
            .iter()
            .enumerate()
            .map(|(sequence, path)| {
                let img = image::open(path).map_err(|source| FrameSourceError::Decode {
                    path: path.clone(),
                    source,
                })?;
                Ok(Frame::from_dynamic(&img, sequence))
            })
            .collect()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
