//! Verification orchestrator.
//!
//! Decodes the whole video, rejects inputs that are too short or too large,
//! then runs the blink, head-movement and identity checks over the same
//! frame buffer and ANDs their outcomes.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::blink::{self, BlinkReport};
use crate::config::LivenessConfig;
use crate::frame::{FrameSource, FrameSourceError};
use crate::identity::{self, MatchReport};
use crate::models::FaceModels;
use crate::movement::{self, MovementReport};
use crate::types::EmbeddingComparator;

/// Reason reported for videos with fewer than `min_frames` frames.
pub const REASON_TOO_SHORT: &str = "Video too short for verification";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot read video: {0}")]
    Source(#[from] FrameSourceError),
}

/// Per-check outcomes of a completed verification.
///
/// Field order is the JSON key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub blinks: bool,
    pub moved_left: bool,
    pub moved_right: bool,
    pub face_match: bool,
    pub match_info: String,
}

impl VerificationResult {
    pub fn success(&self) -> bool {
        self.blinks && self.moved_left && self.moved_right && self.face_match
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VerificationReport {
    Completed(VerificationResult),
    /// Stopped before any check ran.
    Rejected { reason: String },
}

impl VerificationReport {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Overall verdict plus the report it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub success: bool,
    pub report: VerificationReport,
}

impl Verification {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            report: VerificationReport::rejected(reason),
        }
    }

    fn completed(result: VerificationResult) -> Self {
        Self {
            success: result.success(),
            report: VerificationReport::Completed(result),
        }
    }
}

/// Runs liveness verification with a fixed set of models and thresholds.
pub struct Verifier {
    config: LivenessConfig,
    models: FaceModels,
    comparator: Box<dyn EmbeddingComparator>,
}

impl Verifier {
    pub fn new(config: LivenessConfig, models: FaceModels, comparator: Box<dyn EmbeddingComparator>) -> Self {
        Self { config, models, comparator }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// Verify the video in `source` against the face in `profile`.
    ///
    /// Only an unreadable video is an error; every other failure is
    /// reported in the returned [`Verification`].
    pub fn process_video(
        &mut self,
        source: &mut dyn FrameSource,
        profile: &Path,
    ) -> Result<Verification, PipelineError> {
        let frames = match source.read_frames() {
            Ok(frames) => frames,
            Err(FrameSourceError::TooLarge { size, limit }) => {
                tracing::warn!(size, limit, "video rejected: too large");
                return Ok(Verification::rejected(too_large_reason(limit)));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(frames = frames.len(), "video decoded");
        if frames.len() < self.config.min_frames {
            tracing::warn!(frames = frames.len(), min = self.config.min_frames, "video rejected: too short");
            return Ok(Verification::rejected(REASON_TOO_SHORT));
        }

        let track = self.models.track(&frames, self.config.face_selection);
        tracing::debug!(
            frames = track.len(),
            detected = track.detected_frames(),
            "landmark pass complete"
        );

        let blink = blink::analyze_track(&track, &self.config);
        log_blink(&blink);

        let movement = movement::analyze_track(&track, &self.config);
        log_movement(&movement);

        let identity = identity::match_face_with_profile(
            &frames,
            profile,
            &mut self.models,
            self.comparator.as_ref(),
            &self.config,
        );
        log_identity(&identity);

        let verification = Verification::completed(VerificationResult {
            blinks: blink.detected,
            moved_left: movement.moved_left,
            moved_right: movement.moved_right,
            face_match: identity.matched,
            match_info: identity.info,
        });
        tracing::info!(success = verification.success, "verification finished");
        Ok(verification)
    }
}

fn too_large_reason(limit: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if limit >= MIB && limit % MIB == 0 {
        format!("Video file too large. Maximum size is {}MB.", limit / MIB)
    } else {
        format!("Video file too large. Maximum size is {limit} bytes.")
    }
}

fn log_blink(report: &BlinkReport) {
    tracing::info!(
        detected = report.detected,
        blinks = report.blinks,
        scored_frames = report.scored_frames,
        "blink check"
    );
}

fn log_movement(report: &MovementReport) {
    tracing::info!(
        moved_left = report.moved_left,
        moved_right = report.moved_right,
        samples = report.samples,
        center = ?report.center,
        left_excursion = report.left_excursion,
        right_excursion = report.right_excursion,
        "head movement check"
    );
}

fn log_identity(report: &MatchReport) {
    tracing::info!(
        matched = report.matched,
        ratio = report.ratio,
        comparisons = report.comparisons,
        info = %report.info,
        "identity check"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::models::testing::*;
    use crate::types::EuclideanComparator;
    use std::path::PathBuf;

    const PROFILE_KEY: u8 = 250;

    struct FailingSource(FrameSourceError);

    impl FrameSource for FailingSource {
        fn read_frames(&mut self) -> Result<Vec<Frame>, FrameSourceError> {
            Err(std::mem::replace(&mut self.0, FrameSourceError::Unsupported(String::new())))
        }
    }

    fn me() -> Vec<f32> {
        vec![1.0, 0.0]
    }

    fn verifier(script: Script) -> Verifier {
        Verifier::new(
            LivenessConfig::default(),
            scripted_models(script),
            Box::new(EuclideanComparator),
        )
    }

    /// A profile picture on disk whose key pixel is `PROFILE_KEY`.
    fn profile_on_disk(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vigil-{name}-{}.png", std::process::id()));
        frame_with_key(PROFILE_KEY, 0).rgb().save(&path).unwrap();
        path
    }

    /// Forty frames: two blinks, a look left, a look right, always the
    /// profile's face.
    fn live_session() -> (Script, Vec<Frame>) {
        let mut script = Script::default();
        script.faces.insert(PROFILE_KEY, vec![FaceScript::new(0.3, 100.0, me())]);

        let mut frames = Vec::new();
        for i in 0..40u8 {
            let ear = if (5..9).contains(&i) || (15..19).contains(&i) { 0.1 } else { 0.3 };
            let nose_x = match i {
                24..=27 => 50.0,
                30..=33 => 150.0,
                _ => 100.0,
            };
            script.faces.insert(i, vec![FaceScript::new(ear, nose_x, me())]);
            frames.push(frame_with_key(i, i as usize));
        }
        (script, frames)
    }

    #[test]
    fn test_short_video_is_rejected() {
        let (script, frames) = live_session();
        let mut frames = frames;
        frames.truncate(10);
        let mut v = verifier(script);

        let out = v.process_video(&mut frames, Path::new("/nonexistent/profile.png")).unwrap();
        assert!(!out.success);
        assert_eq!(out.report, VerificationReport::rejected(REASON_TOO_SHORT));
        assert_eq!(
            out.report.to_json().unwrap(),
            r#"{"reason":"Video too short for verification"}"#
        );
    }

    #[test]
    fn test_live_session_passes() {
        let (script, mut frames) = live_session();
        let profile = profile_on_disk("pass");
        let mut v = verifier(script);

        let out = v.process_video(&mut frames, &profile).unwrap();
        let _ = std::fs::remove_file(&profile);

        let VerificationReport::Completed(result) = &out.report else {
            panic!("expected a completed report, got {:?}", out.report);
        };
        assert!(result.blinks);
        assert!(result.moved_left);
        assert!(result.moved_right);
        assert!(result.face_match, "{}", result.match_info);
        assert_eq!(result.match_info, "Match confidence: 100.00%");
        assert!(out.success);
    }

    #[test]
    fn test_any_failed_check_fails_verification() {
        let (mut script, mut frames) = live_session();
        // Hold the head still.
        for i in 0..40u8 {
            for face in script.faces.get_mut(&i).unwrap() {
                face.nose_x = 100.0;
            }
        }
        let profile = profile_on_disk("still");
        let mut v = verifier(script);

        let out = v.process_video(&mut frames, &profile).unwrap();
        let _ = std::fs::remove_file(&profile);

        let VerificationReport::Completed(result) = &out.report else {
            panic!("expected a completed report");
        };
        assert!(result.blinks && result.face_match);
        assert!(!result.moved_left && !result.moved_right);
        assert!(!out.success);
    }

    #[test]
    fn test_missing_profile_still_completes() {
        let (script, mut frames) = live_session();
        let mut v = verifier(script);

        let out = v.process_video(&mut frames, Path::new("/nonexistent/vigil/profile.png")).unwrap();
        let VerificationReport::Completed(result) = &out.report else {
            panic!("expected a completed report");
        };
        assert!(!result.face_match);
        assert!(result.match_info.starts_with("Face matching error: "));
        assert!(result.blinks);
        assert!(!out.success);
    }

    #[test]
    fn test_json_key_order() {
        let result = VerificationResult {
            blinks: true,
            moved_left: false,
            moved_right: true,
            face_match: false,
            match_info: "Match confidence: 40.00%".into(),
        };
        assert_eq!(
            VerificationReport::Completed(result).to_json().unwrap(),
            r#"{"blinks":true,"moved_left":false,"moved_right":true,"face_match":false,"match_info":"Match confidence: 40.00%"}"#
        );
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let (script, frames) = live_session();
        let profile = profile_on_disk("repeat");
        let mut v = verifier(script);

        let first = v.process_video(&mut frames.clone(), &profile).unwrap();
        let second = v.process_video(&mut frames.clone(), &profile).unwrap();
        let _ = std::fs::remove_file(&profile);

        assert_eq!(first, second);
        assert_eq!(first.report.to_json().unwrap(), second.report.to_json().unwrap());
    }

    #[test]
    fn test_oversized_video_is_rejected() {
        let mut v = verifier(Script::default());
        let mut source = FailingSource(FrameSourceError::TooLarge {
            size: 60 * 1024 * 1024,
            limit: 50 * 1024 * 1024,
        });

        let out = v.process_video(&mut source, Path::new("profile.png")).unwrap();
        assert!(!out.success);
        assert_eq!(
            out.report,
            VerificationReport::rejected("Video file too large. Maximum size is 50MB.")
        );
    }

    #[test]
    fn test_too_large_reason_below_one_mebibyte() {
        assert_eq!(too_large_reason(512 * 1024), "Video file too large. Maximum size is 524288 bytes.");
        assert_eq!(too_large_reason(0), "Video file too large. Maximum size is 0 bytes.");
        assert_eq!(
            too_large_reason(3 * 1024 * 1024 + 1),
            "Video file too large. Maximum size is 3145729 bytes."
        );
        assert_eq!(too_large_reason(2 * 1024 * 1024), "Video file too large. Maximum size is 2MB.");
    }

    #[test]
    fn test_unreadable_video_is_an_error() {
        let mut v = verifier(Script::default());
        let mut source = FailingSource(FrameSourceError::Unsupported("clip.mp4".into()));
        let err = v.process_video(&mut source, Path::new("profile.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Source(FrameSourceError::Unsupported(_))));
    }
}
