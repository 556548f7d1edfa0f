//! vigil-media — Video inputs decoded into ordered frame sequences.
//!
//! A "video" is an animated GIF, a directory of still frames or, with the
//! `video` feature, any container OpenCV can decode.
//! Sources check the input size against a byte limit before decoding.

pub mod animation;
pub mod sequence;
#[cfg(feature = "video")]
pub mod video;

use std::path::Path;
use vigil_core::{FrameSource, FrameSourceError};

pub use animation::GifAnimation;
pub use sequence::ImageSequence;
#[cfg(feature = "video")]
pub use video::VideoFile;

/// Pick the frame source for `path`.
///
/// Nothing is decoded yet; size and decode errors surface from
/// [`FrameSource::read_frames`].
pub fn open_video(path: &Path, max_bytes: u64) -> Result<Box<dyn FrameSource>, FrameSourceError> {
    let meta = std::fs::metadata(path).map_err(|source| FrameSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if meta.is_dir() {
        tracing::debug!(path = %path.display(), "opening image sequence");
        return Ok(Box::new(ImageSequence::new(path, max_bytes)));
    }

    let is_gif = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
    if is_gif {
        tracing::debug!(path = %path.display(), "opening GIF animation");
        return Ok(Box::new(GifAnimation::new(path, max_bytes)));
    }

    open_container(path, max_bytes)
}

#[cfg(feature = "video")]
fn open_container(path: &Path, max_bytes: u64) -> Result<Box<dyn FrameSource>, FrameSourceError> {
    tracing::debug!(path = %path.display(), "opening video file");
    Ok(Box::new(VideoFile::new(path, max_bytes)))
}

#[cfg(not(feature = "video"))]
fn open_container(path: &Path, _max_bytes: u64) -> Result<Box<dyn FrameSource>, FrameSourceError> {
    Err(FrameSourceError::Unsupported(format!(
        "{}: expected an animated GIF or a directory of frames (build with the `video` feature for other containers)",
        path.display()
    )))
}

pub(crate) fn file_size(path: &Path) -> Result<u64, FrameSourceError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| FrameSourceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    /// A fresh, empty directory under the system temp dir.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vigil-media-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
