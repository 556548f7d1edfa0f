//! vigil-core — Video liveness verification engine.
//!
//! Checks that a recorded face blinks, turns its head both ways and matches
//! a profile picture. Faces are located with SCRFD, landmarked with a
//! 68-point regressor and embedded with ArcFace, all through ONNX Runtime.

pub mod alignment;
pub mod blink;
pub mod config;
pub mod detector;
pub mod frame;
pub mod identity;
pub mod landmarks;
pub mod models;
pub mod movement;
pub mod pipeline;
pub mod recognizer;
pub mod selection;
pub mod types;

use std::path::PathBuf;

pub use config::{ConfigError, LivenessConfig};
pub use frame::{Frame, FrameSource, FrameSourceError};
pub use models::{EmbeddingExtractor, FaceDetector, FaceError, FaceModels, LandmarkPredictor, LandmarkTrack};
pub use pipeline::{PipelineError, Verification, VerificationReport, VerificationResult, Verifier};
pub use selection::FaceSelection;
pub use types::{BoundingBox, CosineComparator, Embedding, EmbeddingComparator, EuclideanComparator, FaceLandmarks, Point};

/// SCRFD detection model file name.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// 68-point landmark model file name.
pub const LANDMARK_MODEL: &str = "1k3d68.onnx";
/// ArcFace recognition model file name.
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

/// Where model files live when no directory is configured:
/// `$XDG_DATA_HOME/vigil/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.local/share")
    });
    PathBuf::from(data_home).join("vigil/models")
}
