//! Model seams and the per-frame landmark pass.
//!
//! The detector, landmark predictor and embedding extractor are external
//! models; each sits behind a trait so the analysis code runs against any
//! implementation. [`FaceModels`] bundles one of each.

use std::path::Path;
use thiserror::Error;

use crate::detector::{DetectorError, ScrfdDetector};
use crate::frame::Frame;
use crate::landmarks::{LandmarkError, OnnxLandmarker};
use crate::recognizer::{ArcFaceRecognizer, RecognizerError};
use crate::{DETECTOR_MODEL, LANDMARK_MODEL, RECOGNIZER_MODEL};
use crate::selection::FaceSelection;
use crate::types::{BoundingBox, Embedding, FaceLandmarks};

/// Locates face regions in a frame.
pub trait FaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Places the 68 landmark points for one detected face.
pub trait LandmarkPredictor {
    fn predict(&mut self, frame: &Frame, face: &BoundingBox) -> Result<FaceLandmarks, LandmarkError>;
}

/// Maps a located face to an identity embedding.
pub trait EmbeddingExtractor {
    fn extract(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
        landmarks: &FaceLandmarks,
    ) -> Result<Embedding, RecognizerError>;
}

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// The three face models, loaded once and reused for every frame.
pub struct FaceModels {
    pub detector: Box<dyn FaceDetector>,
    pub landmarker: Box<dyn LandmarkPredictor>,
    pub recognizer: Box<dyn EmbeddingExtractor>,
}

impl FaceModels {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        landmarker: Box<dyn LandmarkPredictor>,
        recognizer: Box<dyn EmbeddingExtractor>,
    ) -> Self {
        Self { detector, landmarker, recognizer }
    }

    /// Load the ONNX models from `model_dir`. Fails fast if any is missing.
    pub fn load(model_dir: &Path) -> Result<Self, FaceError> {
        let detector = ScrfdDetector::load(&model_dir.join(DETECTOR_MODEL))?;
        let landmarker = OnnxLandmarker::load(&model_dir.join(LANDMARK_MODEL))?;
        let recognizer = ArcFaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL))?;
        tracing::info!(dir = %model_dir.display(), "face models loaded");
        Ok(Self::new(Box::new(detector), Box::new(landmarker), Box::new(recognizer)))
    }

    /// Landmarks for the selected face, or `None` when the frame has no face.
    pub fn primary_landmarks(
        &mut self,
        frame: &Frame,
        selection: FaceSelection,
    ) -> Result<Option<FaceLandmarks>, FaceError> {
        let faces = self.detector.detect(frame)?;
        let Some(face) = selection.select(&faces) else {
            return Ok(None);
        };
        Ok(Some(self.landmarker.predict(frame, face)?))
    }

    /// One embedding per detected face, in detector order.
    pub fn embeddings(&mut self, frame: &Frame) -> Result<Vec<Embedding>, FaceError> {
        let faces = self.detector.detect(frame)?;
        let mut out = Vec::with_capacity(faces.len());
        for face in &faces {
            let landmarks = self.landmarker.predict(frame, face)?;
            out.push(self.recognizer.extract(frame, face, &landmarks)?);
        }
        Ok(out)
    }

    /// Run the landmark pass over a whole frame sequence.
    ///
    /// A frame whose models fail is logged and recorded as a miss, the same
    /// as a frame without a face.
    pub fn track(&mut self, frames: &[Frame], selection: FaceSelection) -> LandmarkTrack {
        let per_frame = frames
            .iter()
            .map(|frame| match self.primary_landmarks(frame, selection) {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    tracing::warn!(frame = frame.sequence, error = %e, "landmark pass: skipping frame");
                    None
                }
            })
            .collect();
        LandmarkTrack::new(per_frame)
    }
}

/// Selected-face landmarks for every frame of a video, `None` where no face
/// was found.
#[derive(Debug, Clone, Default)]
pub struct LandmarkTrack {
    frames: Vec<Option<FaceLandmarks>>,
}

impl LandmarkTrack {
    pub fn new(frames: Vec<Option<FaceLandmarks>>) -> Self {
        Self { frames }
    }

    /// Number of frames covered, including misses.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Landmarks of the frames with a face, in frame order.
    pub fn detections(&self) -> impl Iterator<Item = &FaceLandmarks> {
        self.frames.iter().flatten()
    }

    pub fn detected_frames(&self) -> usize {
        self.detections().count()
    }
}
