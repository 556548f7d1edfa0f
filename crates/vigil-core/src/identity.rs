//! Identity matching against a reference profile picture.
//!
//! Frames are sampled at a fixed stride of `frames / identity_samples`
//! starting at frame 0. Every face on every sampled frame is compared with
//! the reference embedding and all outcomes are pooled; the video matches
//! when the share of positive comparisons reaches `match_ratio_threshold`.
//!
//! When the frame count is not a multiple of the sample count the stride
//! rounds down, so the tail of the video can hold an extra sample or none.

use std::path::Path;
use thiserror::Error;

use crate::config::LivenessConfig;
use crate::frame::Frame;
use crate::models::{FaceError, FaceModels};
use crate::types::{Embedding, EmbeddingComparator};

/// Info string when the profile picture holds no face.
pub const NO_PROFILE_FACE: &str = "No face found in profile picture";
/// Info string when the profile picture holds more than one face.
pub const MULTIPLE_PROFILE_FACES: &str = "Multiple faces found in profile picture";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("cannot load profile picture {path}: {source}")]
    ProfileImage {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("No face found in profile picture")]
    NoProfileFace,
    #[error("Multiple faces found in profile picture")]
    MultipleProfileFaces(usize),
    #[error("{frames} frames are too few for {samples} identity samples")]
    TooFewFrames { frames: usize, samples: usize },
    #[error(transparent)]
    Model(#[from] FaceError),
}

/// The embedding of the single face in a profile picture.
#[derive(Debug, Clone)]
pub struct ReferenceIdentity {
    embedding: Embedding,
}

impl ReferenceIdentity {
    /// Build from an already-decoded image. Exactly one face must be present.
    pub fn from_frame(frame: &Frame, models: &mut FaceModels) -> Result<Self, IdentityError> {
        let mut embeddings = models.embeddings(frame)?;
        match embeddings.len() {
            0 => Err(IdentityError::NoProfileFace),
            1 => Ok(Self { embedding: embeddings.remove(0) }),
            n => Err(IdentityError::MultipleProfileFaces(n)),
        }
    }

    pub fn from_image(path: &Path, models: &mut FaceModels) -> Result<Self, IdentityError> {
        let frame = Frame::open(path).map_err(|source| IdentityError::ProfileImage {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_frame(&frame, models)
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }
}

/// Outcome of the identity check.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub matched: bool,
    /// Human-readable outcome, e.g. "Match confidence: 73.33%".
    pub info: String,
    /// Share of positive comparisons, in [0, 1].
    pub ratio: f64,
    pub comparisons: usize,
}

impl MatchReport {
    fn failure(info: impl Into<String>) -> Self {
        Self {
            matched: false,
            info: info.into(),
            ratio: 0.0,
            comparisons: 0,
        }
    }

    fn from_outcomes(outcomes: &[bool], threshold: f64) -> Self {
        let ratio = match_ratio(outcomes);
        Self {
            matched: ratio >= threshold,
            info: format!("Match confidence: {:.2}%", ratio * 100.0),
            ratio,
            comparisons: outcomes.len(),
        }
    }
}

/// Frame indices `0, stride, 2·stride, …` below `frame_count`, with
/// `stride = frame_count / samples`.
pub fn sample_indices(frame_count: usize, samples: usize) -> Result<Vec<usize>, IdentityError> {
    let stride = frame_count.checked_div(samples).unwrap_or(0);
    if stride == 0 {
        return Err(IdentityError::TooFewFrames { frames: frame_count, samples });
    }
    Ok((0..frame_count).step_by(stride).collect())
}

/// Share of `true` outcomes; 0 when there are none.
pub fn match_ratio(outcomes: &[bool]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().filter(|&&m| m).count() as f64 / outcomes.len() as f64
}

/// Compare every face on every sampled frame with the reference.
pub fn compare_sampled_frames(
    frames: &[Frame],
    reference: &ReferenceIdentity,
    models: &mut FaceModels,
    comparator: &dyn EmbeddingComparator,
    config: &LivenessConfig,
) -> Result<Vec<bool>, IdentityError> {
    let mut outcomes = Vec::new();
    for idx in sample_indices(frames.len(), config.identity_samples)? {
        let frame = &frames[idx];
        for embedding in models.embeddings(frame)? {
            let matched = comparator.matches(reference.embedding(), &embedding, config.match_tolerance);
            tracing::debug!(frame = frame.sequence, matched, "identity comparison");
            outcomes.push(matched);
        }
    }
    Ok(outcomes)
}

/// Identity check against an already-built reference. Errors become a
/// failed report carrying the error text.
pub fn match_against_reference(
    frames: &[Frame],
    reference: &ReferenceIdentity,
    models: &mut FaceModels,
    comparator: &dyn EmbeddingComparator,
    config: &LivenessConfig,
) -> MatchReport {
    match compare_sampled_frames(frames, reference, models, comparator, config) {
        Ok(outcomes) => MatchReport::from_outcomes(&outcomes, config.match_ratio_threshold),
        Err(e) => {
            tracing::warn!(error = %e, "face matching failed");
            MatchReport::failure(format!("Face matching error: {e}"))
        }
    }
}

/// Identity check against the face in a profile picture on disk.
///
/// Never fails: a missing or faceless profile, or any model error, yields
/// `matched = false` with the reason in `info`.
pub fn match_face_with_profile(
    frames: &[Frame],
    profile_path: &Path,
    models: &mut FaceModels,
    comparator: &dyn EmbeddingComparator,
    config: &LivenessConfig,
) -> MatchReport {
    let reference = match ReferenceIdentity::from_image(profile_path, models) {
        Ok(reference) => reference,
        Err(IdentityError::NoProfileFace) => {
            tracing::warn!(profile = %profile_path.display(), "no face in profile picture");
            return MatchReport::failure(NO_PROFILE_FACE);
        }
        Err(IdentityError::MultipleProfileFaces(count)) => {
            tracing::warn!(profile = %profile_path.display(), count, "several faces in profile picture");
            return MatchReport::failure(MULTIPLE_PROFILE_FACES);
        }
        Err(e) => {
            tracing::warn!(error = %e, "face matching failed");
            return MatchReport::failure(format!("Face matching error: {e}"));
        }
    };

    match_against_reference(frames, &reference, models, comparator, config)
}
