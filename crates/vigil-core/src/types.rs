use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::landmarks::LandmarkError;

/// Number of points produced by the 68-point landmark layout.
pub const LANDMARK_COUNT: usize = 68;

// 68-point layout regions. "Left"/"right" are the subject's, so the right eye
// appears on the image's left side.
const RIGHT_EYE: Range<usize> = 36..42;
const LEFT_EYE: Range<usize> = 42..48;
const NOSE_TIP: usize = 30;
const MOUTH_LEFT_CORNER: usize = 48;
const MOUTH_RIGHT_CORNER: usize = 54;

/// A 2-D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Arithmetic mean of a set of points. Empty input yields the origin.
    pub fn centroid(points: &[Point]) -> Point {
        if points.is_empty() {
            return Point::default();
        }
        let n = points.len() as f32;
        let (sx, sy) = points
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }
}

/// Bounding box for a detected face, with optional detector keypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five detector keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth]
    /// in image orientation.
    pub keypoints: Option<[Point; 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The 68 ordered landmark points of one detected face.
///
/// Construction enforces the point count, so region accessors never slice
/// out of bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongPointCount(points.len()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Subject's left eye, points 42–47.
    pub fn left_eye(&self) -> &[Point] {
        &self.points[LEFT_EYE]
    }

    /// Subject's right eye, points 36–41.
    pub fn right_eye(&self) -> &[Point] {
        &self.points[RIGHT_EYE]
    }

    /// Nose tip, point 30.
    pub fn nose_tip(&self) -> Point {
        self.points[NOSE_TIP]
    }

    /// Five alignment points in image orientation, matching the ArcFace
    /// reference layout: [image-left eye, image-right eye, nose, left mouth, right mouth].
    pub fn alignment_points(&self) -> [Point; 5] {
        [
            Point::centroid(self.right_eye()),
            Point::centroid(self.left_eye()),
            self.nose_tip(),
            self.points[MOUTH_LEFT_CORNER],
            self.points[MOUTH_RIGHT_CORNER],
        ]
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Decides whether a candidate embedding belongs to the same identity as a
/// reference embedding, given a tolerance.
pub trait EmbeddingComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding, tolerance: f32) -> bool;
}

/// Match when the Euclidean distance is within `tolerance`.
pub struct EuclideanComparator;

impl EmbeddingComparator for EuclideanComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding, tolerance: f32) -> bool {
        reference.euclidean_distance(candidate) <= tolerance
    }
}

/// Match when cosine similarity is at least `1 - tolerance`.
pub struct CosineComparator;

impl EmbeddingComparator for CosineComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding, tolerance: f32) -> bool {
        reference.similarity(candidate) >= 1.0 - tolerance
    }
}
