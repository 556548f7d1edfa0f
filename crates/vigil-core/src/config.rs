//! Verification thresholds.
//!
//! Every tunable of the blink, movement and identity checks lives here with
//! its default. Values can come from a TOML file (missing keys keep their
//! defaults) and be overridden by `VIGIL_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::selection::FaceSelection;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Averaged eye aspect ratio below which a frame counts as eyes-closed.
    pub eye_ar_threshold: f32,
    /// Minimum run of consecutive closed frames that completes a blink on reopening.
    pub eye_ar_consec_frames: usize,
    /// Completed blinks required for the blink check to pass.
    pub blink_count_goal: usize,
    /// Nose-tip excursion from the mean position (pixels) required per side.
    pub movement_threshold: f32,
    /// Fewer nose-tip samples than this means no movement is proven.
    pub min_movement_samples: usize,
    /// Embedding comparison tolerance handed to the comparator.
    pub match_tolerance: f32,
    /// Fraction of matching comparisons required for the identity check.
    pub match_ratio_threshold: f64,
    /// Divisor for the identity sampling stride (`frames / identity_samples`).
    pub identity_samples: usize,
    /// Videos with fewer decoded frames are rejected before analysis.
    pub min_frames: usize,
    /// Inputs larger than this many bytes are rejected before decoding.
    pub max_video_bytes: u64,
    /// Which face to analyse when a frame contains several.
    pub face_selection: FaceSelection,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            eye_ar_threshold: 0.25,
            eye_ar_consec_frames: 3,
            blink_count_goal: 2,
            movement_threshold: 20.0,
            min_movement_samples: 10,
            match_tolerance: 0.6,
            match_ratio_threshold: 0.6,
            identity_samples: 5,
            min_frames: 30,
            max_video_bytes: 50 * 1024 * 1024,
            face_selection: FaceSelection::First,
        }
    }
}

impl LivenessConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// Override fields from `VIGIL_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(mut self) -> Self {
        override_from_env("VIGIL_EYE_AR_THRESHOLD", &mut self.eye_ar_threshold);
        override_from_env("VIGIL_EYE_AR_CONSEC_FRAMES", &mut self.eye_ar_consec_frames);
        override_from_env("VIGIL_BLINK_COUNT_GOAL", &mut self.blink_count_goal);
        override_from_env("VIGIL_MOVEMENT_THRESHOLD", &mut self.movement_threshold);
        override_from_env("VIGIL_MIN_MOVEMENT_SAMPLES", &mut self.min_movement_samples);
        override_from_env("VIGIL_MATCH_TOLERANCE", &mut self.match_tolerance);
        override_from_env("VIGIL_MATCH_RATIO_THRESHOLD", &mut self.match_ratio_threshold);
        override_from_env("VIGIL_IDENTITY_SAMPLES", &mut self.identity_samples);
        override_from_env("VIGIL_MIN_FRAMES", &mut self.min_frames);
        override_from_env("VIGIL_MAX_VIDEO_BYTES", &mut self.max_video_bytes);
        override_from_env("VIGIL_FACE_SELECTION", &mut self.face_selection);
        self
    }

    /// Reject values that would make a check meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("eye_ar_threshold", self.eye_ar_threshold)?;
        non_negative("movement_threshold", self.movement_threshold)?;
        non_negative("match_tolerance", self.match_tolerance)?;
        if !(0.0..=1.0).contains(&self.match_ratio_threshold) {
            return Err(ConfigError::Invalid {
                field: "match_ratio_threshold",
                reason: format!("{} is outside [0, 1]", self.match_ratio_threshold),
            });
        }
        if self.identity_samples == 0 {
            return Err(ConfigError::Invalid {
                field: "identity_samples",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_video_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_video_bytes",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is not a finite non-negative number"),
        })
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config override"),
    }
}
