//! Blink detection from the eye aspect ratio (EAR) signal.
//!
//! For each frame with a face, the EAR of both eyes is averaged into one
//! openness score. A run of at least `eye_ar_consec_frames` scores below
//! `eye_ar_threshold` followed by a reopened frame completes one blink.
//!
//! Frames without a face are ignored: they neither extend nor break a run.
//! A face whose eye has no horizontal extent scores a non-finite EAR, which
//! fails the threshold test and so counts as an open frame.
//! A closure still in progress when the video ends is not counted.

use crate::config::LivenessConfig;
use crate::frame::Frame;
use crate::models::{FaceModels, LandmarkTrack};
use crate::types::{FaceLandmarks, Point};

/// Eye aspect ratio of six eye landmarks `p1..p6`:
/// `(|p2 − p6| + |p3 − p5|) / (2·|p1 − p4|)`.
///
/// Returns `None` unless exactly six points are given. An eye with no
/// horizontal extent yields infinity, or NaN when it is a single point.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f32> {
    let [p1, p2, p3, p4, p5, p6] = eye else {
        return None;
    };
    Some((p2.distance(p6) + p3.distance(p5)) / (2.0 * p1.distance(p4)))
}

/// Mean EAR of both eyes, the per-frame openness score.
pub fn frame_score(landmarks: &FaceLandmarks) -> Option<f32> {
    let left = eye_aspect_ratio(landmarks.left_eye())?;
    let right = eye_aspect_ratio(landmarks.right_eye())?;
    Some((left + right) / 2.0)
}

/// Closed-run / completed-blink state for one pass over a video.
#[derive(Debug, Clone)]
pub struct BlinkCounter {
    threshold: f32,
    min_closed_frames: usize,
    /// Consecutive below-threshold frames in the current run.
    frame_counter: usize,
    /// Completed blinks.
    blink_counter: usize,
}

impl BlinkCounter {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            threshold: config.eye_ar_threshold,
            min_closed_frames: config.eye_ar_consec_frames,
            frame_counter: 0,
            blink_counter: 0,
        }
    }

    /// Feed one frame's score. Returns true when this frame completes a blink.
    /// NaN is never below the threshold and is handled as an open eye.
    pub fn observe(&mut self, score: f32) -> bool {
        if score < self.threshold {
            self.frame_counter += 1;
            return false;
        }

        let completed = self.frame_counter >= self.min_closed_frames;
        if completed {
            self.blink_counter += 1;
        }
        self.frame_counter = 0;
        completed
    }

    pub fn blinks(&self) -> usize {
        self.blink_counter
    }
}

/// Outcome of the blink check.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkReport {
    /// Whether at least `blink_count_goal` blinks were completed.
    pub detected: bool,
    pub blinks: usize,
    /// Frames that produced an openness score.
    pub scored_frames: usize,
}

/// Count completed blinks in a sequence of openness scores.
pub fn count_blinks(scores: impl IntoIterator<Item = f32>, config: &LivenessConfig) -> usize {
    let mut counter = BlinkCounter::new(config);
    for score in scores {
        counter.observe(score);
    }
    counter.blinks()
}

/// Blink check over a precomputed landmark track.
pub fn analyze_track(track: &LandmarkTrack, config: &LivenessConfig) -> BlinkReport {
    let scores: Vec<f32> = track.detections().filter_map(frame_score).collect();
    let blinks = count_blinks(scores.iter().copied(), config);

    BlinkReport {
        detected: blinks >= config.blink_count_goal,
        blinks,
        scored_frames: scores.len(),
    }
}

/// Blink check over raw frames, running its own landmark pass.
pub fn detect_blinks(frames: &[Frame], models: &mut FaceModels, config: &LivenessConfig) -> BlinkReport {
    let track = models.track(frames, config.face_selection);
    analyze_track(&track, config)
}
