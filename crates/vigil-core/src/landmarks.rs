//! 68-point facial landmark regressor via ONNX Runtime.
//!
//! Works with InsightFace's `1k3d68.onnx` (3-D output, 3309 values) and plain
//! 2-D regressors that emit 136 values. The face is cropped to a square 1.5x
//! the detector box, resized to 192x192, and the normalised predictions are
//! mapped back into frame pixels.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::alignment::sample_bilinear;
use crate::frame::Frame;
use crate::models::LandmarkPredictor;
use crate::types::{BoundingBox, FaceLandmarks, Point, LANDMARK_COUNT};

const LANDMARK_INPUT_SIZE: usize = 192;
const LANDMARK_CROP_SCALE: f32 = 1.5;
// Outputs at least this long carry (x, y, z) triples.
const LANDMARK_3D_MIN_LEN: usize = 3000;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0} — download 1k3d68.onnx from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {LANDMARK_COUNT} landmark points, got {0}")]
    WrongPointCount(usize),
    #[error("face box has no area")]
    EmptyFace,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Square frame region fed to the landmark model.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FaceCrop {
    left: f32,
    top: f32,
    side: f32,
}

impl FaceCrop {
    fn around(face: &BoundingBox) -> Option<Self> {
        let side = face.width.max(face.height) * LANDMARK_CROP_SCALE;
        if !side.is_finite() || side <= 0.0 {
            return None;
        }
        let c = face.center();
        Some(Self {
            left: c.x - side / 2.0,
            top: c.y - side / 2.0,
            side,
        })
    }

    /// Map a model-input pixel position to frame pixels.
    fn to_frame(&self, u: f32, v: f32) -> Point {
        let k = self.side / LANDMARK_INPUT_SIZE as f32;
        Point::new(self.left + u * k, self.top + v * k)
    }
}

/// ONNX-backed 68-point landmark predictor.
pub struct OnnxLandmarker {
    session: Session,
}

impl OnnxLandmarker {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }
}

impl LandmarkPredictor for OnnxLandmarker {
    fn predict(&mut self, frame: &Frame, face: &BoundingBox) -> Result<FaceLandmarks, LandmarkError> {
        let crop = FaceCrop::around(face).ok_or(LandmarkError::EmptyFace)?;
        let input = crop_tensor(frame, &crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        FaceLandmarks::new(decode_points(raw, &crop)?)
    }
}

/// Sample the crop into a 1x3x192x192 tensor of raw pixel values.
fn crop_tensor(frame: &Frame, crop: &FaceCrop) -> Array4<f32> {
    let size = LANDMARK_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for v in 0..size {
        for u in 0..size {
            let p = crop.to_frame(u as f32, v as f32);
            let value = sample_bilinear(frame.luma(), p.x, p.y, 0);
            for c in 0..3 {
                tensor[[0, c, v, u]] = value;
            }
        }
    }
    tensor
}

/// Turn raw model output into frame-space points.
///
/// The final 68 rows are the landmarks; coordinates are in [-1, 1] across the
/// model input.
fn decode_points(raw: &[f32], crop: &FaceCrop) -> Result<Vec<Point>, LandmarkError> {
    let dims = if raw.len() >= LANDMARK_3D_MIN_LEN { 3 } else { 2 };
    let rows = raw.len() / dims;
    if rows < LANDMARK_COUNT {
        return Err(LandmarkError::WrongPointCount(rows));
    }

    let half = LANDMARK_INPUT_SIZE as f32 / 2.0;
    Ok(raw
        .chunks_exact(dims)
        .skip(rows - LANDMARK_COUNT)
        .map(|r| crop.to_frame((r[0] + 1.0) * half, (r[1] + 1.0) * half))
        .collect())
}
