//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame to 640x640, decodes the three anchor-free stride
//! levels and suppresses overlapping boxes.

use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::frame::Frame;
use crate::models::FaceDetector;
use crate::types::{BoundingBox, Point};

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting a frame into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let target = SCRFD_INPUT_SIZE as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let (new_w, new_h) = Self::scaled_size(width, height, scale);
        Self {
            scale,
            pad_x: (SCRFD_INPUT_SIZE - new_w) as f32 / 2.0,
            pad_y: (SCRFD_INPUT_SIZE - new_h) as f32 / 2.0,
        }
    }

    fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
        let w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        (w, h)
    }

    /// Map a point in model input space back to frame pixels.
    fn to_frame(&self, x: f32, y: f32) -> Point {
        Point::new((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                names.len()
            )));
        }

        let outputs = map_outputs(&names);
        tracing::info!(path = %model_path.display(), outputs = ?names, mapping = ?outputs, "loaded SCRFD model");

        Ok(Self { session, outputs })
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = letterbox_tensor(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let slots = self.outputs[level];
            let (_, scores) = outputs[slots.score]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[slots.bbox]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[slots.kps]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            candidates.extend(decode_level(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        Ok(non_max_suppression(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Resolve output tensors by name ("score_8", "bbox_16", ...), falling back to
/// the positional layout [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: position("score", stride)?,
                bbox: position("bbox", stride)?,
                kps: position("kps", stride)?,
            })
        })
        .collect();

    named
        .and_then(|levels| <[StrideOutputs; 3]>::try_from(levels).ok())
        .unwrap_or([
            StrideOutputs { score: 0, bbox: 3, kps: 6 },
            StrideOutputs { score: 1, bbox: 4, kps: 7 },
            StrideOutputs { score: 2, bbox: 5, kps: 8 },
        ])
}

/// Build the NCHW input tensor. Padding stays at 0.0, the normalised mean.
fn letterbox_tensor(frame: &Frame) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(frame.width(), frame.height());
    let (new_w, new_h) = Letterbox::scaled_size(frame.width(), frame.height(), letterbox.scale);
    let resized = imageops::resize(frame.luma(), new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let off_x = letterbox.pad_x.floor() as usize;
    let off_y = letterbox.pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        let v = (px[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        if tx < size && ty < size {
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = v;
            }
        }
    }

    (tensor, letterbox)
}

/// Decode the above-threshold anchors of one stride level into frame-space boxes.
fn decode_level(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|i| {
            let score = *scores.get(i)?;
            if score <= threshold {
                return None;
            }

            let cell = i / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * s;
            let ay = (cell / grid) as f32 * s;

            // Distances from the anchor to the box edges, in stride units.
            let d = bboxes.get(i * 4..i * 4 + 4)?;
            let top_left = letterbox.to_frame(ax - d[0] * s, ay - d[1] * s);
            let bottom_right = letterbox.to_frame(ax + d[2] * s, ay + d[3] * s);

            let keypoints = kps.get(i * 10..i * 10 + 10).map(|k| {
                std::array::from_fn(|p| letterbox.to_frame(ax + k[2 * p] * s, ay + k[2 * p + 1] * s))
            });

            Some(BoundingBox {
                x: top_left.x,
                y: top_left.y,
                width: bottom_right.x - top_left.x,
                height: bottom_right.y - top_left.y,
                confidence: score,
                keypoints,
            })
        })
        .collect()
}

/// Greedy NMS. The result is ordered by descending confidence.
fn non_max_suppression(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection-over-Union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, keypoints: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let candidates = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let kept = non_max_suppression(candidates, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_output_makes_first_the_most_confident() {
        use crate::selection::FaceSelection;
        let candidates = vec![
            make_bbox(0.0, 0.0, 80.0, 80.0, 0.6),
            make_bbox(200.0, 0.0, 20.0, 20.0, 0.95),
            make_bbox(400.0, 0.0, 40.0, 40.0, 0.7),
        ];
        assert_eq!(FaceSelection::First.select_index(&candidates), Some(0));
        assert_eq!(FaceSelection::MostConfident.select_index(&candidates), Some(1));

        let kept = non_max_suppression(candidates, 0.4);
        assert_eq!(kept.len(), 3);
        assert_eq!(FaceSelection::First.select_index(&kept), Some(0));
        assert_eq!(FaceSelection::MostConfident.select_index(&kept), Some(0));
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
        assert_eq!(FaceSelection::Largest.select_index(&kept), Some(2));
    }

    #[test]
    fn test_nms_empty() {
        assert!(non_max_suppression(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::fit(320, 240);
        // 320x240 scales by 2 to 640x480, padded 80 px top and bottom.
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);

        let p = lb.to_frame(100.0 * 2.0, 50.0 * 2.0 + 80.0);
        assert!((p.x - 100.0).abs() < 1e-4);
        assert!((p.y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_letterbox_tensor_padding_is_zero() {
        let frame = Frame::new(RgbImage::from_pixel(320, 240, Rgb([255, 255, 255])), 0);
        let (tensor, lb) = letterbox_tensor(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(lb.pad_y, 80.0);

        // Padding rows
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 2, 639, 639]], 0.0);
        // Image rows carry the normalised pixel on every channel
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        for c in 0..3 {
            assert!((tensor[[0, c, 320, 320]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_letterbox_tensor_reads_luma_of_colour_frame() {
        let frame = Frame::new(RgbImage::from_pixel(640, 640, Rgb([255, 0, 0])), 0);
        let (tensor, _) = letterbox_tensor(&frame);
        let luma = frame.luma().get_pixel(10, 10)[0] as f32;
        assert!(luma > 0.0 && luma < 255.0);
        let expected = (luma - SCRFD_MEAN) / SCRFD_STD;
        for c in 0..3 {
            assert!((tensor[[0, c, 10, 10]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_level_single_anchor() {
        let stride = 32;
        let grid = 640 / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        // Cell (x=2, y=1), second anchor in the cell.
        let idx = (grid + 2) * SCRFD_ANCHORS_PER_CELL + 1;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let dets = decode_level(&scores, &bboxes, &kps, stride, &lb, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        // Anchor at (64, 32), one stride on each side.
        assert!((d.x - 32.0).abs() < 1e-4);
        assert!((d.y - 0.0).abs() < 1e-4);
        assert!((d.width - 64.0).abs() < 1e-4);
        assert!((d.height - 64.0).abs() < 1e-4);
        let kp = d.keypoints.expect("keypoints decoded");
        assert_eq!(kp[0], Point::new(64.0, 32.0));
    }

    #[test]
    fn test_decode_level_skips_low_scores_and_short_tensors() {
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let scores = vec![0.4f32, 0.95];
        // bbox tensor too short for the second anchor
        let bboxes = vec![0.0f32; 4];
        assert!(decode_level(&scores, &bboxes, &[], 32, &lb, 0.5).is_empty());
    }

    #[test]
    fn test_map_outputs_named_and_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let m = map_outputs(&names);
        assert_eq!(m[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(m[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        let m = map_outputs(&names);
        assert_eq!(m[0], StrideOutputs { score: 0, bbox: 3, kps: 6 });
        assert_eq!(m[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
        assert_eq!(m[2], StrideOutputs { score: 2, bbox: 5, kps: 8 });
    }
}
