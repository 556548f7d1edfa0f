//! Head-turn detection from the horizontal nose-tip position.
//!
//! The nose tip's x coordinate is sampled in every frame with a face. The
//! mean of all samples is the resting centre; the head counts as turned to a
//! side when the furthest sample on that side lies more than
//! `movement_threshold` pixels from the centre. Both sides can pass in one
//! video and their order does not matter.

use crate::config::LivenessConfig;
use crate::frame::Frame;
use crate::models::{FaceModels, LandmarkTrack};

/// Outcome of the head-movement check.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementReport {
    pub moved_left: bool,
    pub moved_right: bool,
    /// Number of nose-tip samples collected.
    pub samples: usize,
    /// Mean nose-tip x, when enough samples were collected.
    pub center: Option<f64>,
    /// `center - min(samples)`
    pub left_excursion: f64,
    /// `max(samples) - center`
    pub right_excursion: f64,
}

impl MovementReport {
    fn insufficient(samples: usize) -> Self {
        Self {
            moved_left: false,
            moved_right: false,
            samples,
            center: None,
            left_excursion: 0.0,
            right_excursion: 0.0,
        }
    }
}

/// Movement check over raw nose-tip x positions, in frame order.
///
/// Fewer than `min_movement_samples` positions prove nothing and report no
/// movement either way.
pub fn analyze_positions(positions: &[f32], config: &LivenessConfig) -> MovementReport {
    if positions.is_empty() || positions.len() < config.min_movement_samples {
        return MovementReport::insufficient(positions.len());
    }

    let n = positions.len() as f64;
    let center = positions.iter().map(|&x| x as f64).sum::<f64>() / n;
    let (min, max) = positions
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x as f64), hi.max(x as f64))
        });

    let threshold = config.movement_threshold as f64;
    let left_excursion = center - min;
    let right_excursion = max - center;

    MovementReport {
        moved_left: left_excursion > threshold,
        moved_right: right_excursion > threshold,
        samples: positions.len(),
        center: Some(center),
        left_excursion,
        right_excursion,
    }
}

/// Movement check over a precomputed landmark track.
pub fn analyze_track(track: &LandmarkTrack, config: &LivenessConfig) -> MovementReport {
    let positions: Vec<f32> = track.detections().map(|lm| lm.nose_tip().x).collect();
    analyze_positions(&positions, config)
}

/// Movement check over raw frames, running its own landmark pass.
pub fn detect_head_movement(
    frames: &[Frame],
    models: &mut FaceModels,
    config: &LivenessConfig,
) -> MovementReport {
    let track = models.track(frames, config.face_selection);
    analyze_track(&track, config)
}
