//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a face onto the canonical 112×112 ArcFace layout using five
//! alignment points (eye centres, nose tip, mouth corners).

use image::{ImageBuffer, Pixel, Rgb, RgbImage};

use crate::frame::Frame;
use crate::types::Point;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [Point; 5] = [
    Point::new(38.2946, 51.6963), // left eye
    Point::new(73.5318, 51.5014), // right eye
    Point::new(56.0252, 71.7366), // nose
    Point::new(41.5493, 92.3655), // left mouth
    Point::new(70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// `p' = [a -b; b a] p + t`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit from `src` to `dst`. `None` when the source points
    /// coincide.
    fn estimate(src: &[Point; 5], dst: &[Point; 5]) -> Option<Self> {
        let ms = Point::centroid(src);
        let md = Point::centroid(dst);

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.x - ms.x, s.y - ms.y);
            let (dx, dy) = (d.x - md.x, d.y - md.y);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }
        if spread < 1e-12 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: md.x - (a * ms.x - b * ms.y),
            ty: md.y - (b * ms.x + a * ms.y),
        })
    }

    fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x - self.b * p.y + self.tx,
            self.b * p.x + self.a * p.y + self.ty,
        )
    }

    fn invert(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample of one channel at a sub-pixel position. Pixels outside the
/// image read as 0.
pub(crate) fn sample_bilinear<P>(img: &ImageBuffer<P, Vec<u8>>, x: f32, y: f32, channel: usize) -> f32
where
    P: Pixel<Subpixel = u8>,
{
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let (fx0, fy0) = (x.floor(), y.floor());
    let (fx, fy) = (x - fx0, y - fy0);
    let (x0, y0) = (fx0 as i64, fy0 as i64);

    let px = |xi: i64, yi: i64| -> f32 {
        if xi >= 0 && yi >= 0 && xi < img.width() as i64 && yi < img.height() as i64 {
            img.get_pixel(xi as u32, yi as u32).channels()[channel] as f32
        } else {
            0.0
        }
    };

    px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1) * (1.0 - fx) * fy
        + px(x0 + 1, y0 + 1) * fx * fy
}

/// Align a face to a canonical 112×112 colour crop.
///
/// Degenerate alignment points produce a black crop.
pub fn align_face(frame: &Frame, points: &[Point; 5]) -> RgbImage {
    let Some(inverse) = Similarity::estimate(points, &REFERENCE_LANDMARKS_112).and_then(|m| m.invert())
    else {
        tracing::debug!(frame = frame.sequence, "degenerate alignment points");
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| {
        let src = inverse.apply(Point::new(x as f32, y as f32));
        Rgb(std::array::from_fn(|c| {
            sample_bilinear(frame.rgb(), src.x, src.y, c).round().clamp(0.0, 255.0) as u8
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_identity_transform() {
        let m = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((m.a - 1.0).abs() < 1e-4, "a = {}", m.a);
        assert!(m.b.abs() < 1e-4, "b = {}", m.b);
        assert!(m.tx.abs() < 1e-2, "tx = {}", m.tx);
        assert!(m.ty.abs() < 1e-2, "ty = {}", m.ty);
    }

    #[test]
    fn test_scaled_transform() {
        // Source at 2x scale → a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|p| Point::new(p.x * 2.0, p.y * 2.0));
        let m = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((m.a - 0.5).abs() < 1e-4, "a = {}", m.a);
        assert!(m.b.abs() < 1e-4);
    }

    #[test]
    fn test_recovers_rotation_and_translation() {
        let truth = Similarity { a: 0.8, b: 0.6, tx: 5.0, ty: -3.0 };
        let dst = REFERENCE_LANDMARKS_112.map(|p| truth.apply(p));
        let m = Similarity::estimate(&REFERENCE_LANDMARKS_112, &dst).unwrap();
        assert!((m.a - 0.8).abs() < 1e-3);
        assert!((m.b - 0.6).abs() < 1e-3);
        assert!((m.tx - 5.0).abs() < 1e-2);
        assert!((m.ty + 3.0).abs() < 1e-2);
    }

    #[test]
    fn test_invert_roundtrip() {
        let m = Similarity { a: 1.2, b: -0.4, tx: 10.0, ty: 7.0 };
        let inv = m.invert().unwrap();
        let p = Point::new(33.0, -12.0);
        let back = inv.apply(m.apply(p));
        assert!((back.x - p.x).abs() < 1e-3);
        assert!((back.y - p.y).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_points() {
        let same = [Point::new(5.0, 5.0); 5];
        assert!(Similarity::estimate(&same, &REFERENCE_LANDMARKS_112).is_none());

        let frame = Frame::new(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])), 0);
        let aligned = align_face(&frame, &same);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert!(aligned.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_sample_bilinear() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([100]));
        assert!((sample_bilinear(&img, 0.5, 0.0, 0) - 50.0).abs() < 1e-4);
        assert_eq!(sample_bilinear(&img, 1.0, 0.0, 0), 100.0);
        assert_eq!(sample_bilinear(&img, -5.0, 0.0, 0), 0.0);
        assert_eq!(sample_bilinear(&img, f32::NAN, 0.0, 0), 0.0);
    }

    #[test]
    fn test_sample_bilinear_per_channel() {
        let img = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        assert_eq!(sample_bilinear(&img, 0.5, 0.5, 0), 10.0);
        assert_eq!(sample_bilinear(&img, 0.5, 0.5, 1), 20.0);
        assert_eq!(sample_bilinear(&img, 0.5, 0.5, 2), 30.0);
    }

    #[test]
    fn test_aligned_crop_keeps_colour() {
        let frame = Frame::new(RgbImage::from_pixel(200, 200, Rgb([200, 40, 10])), 0);
        let src = [
            Point::new(80.0, 60.0),
            Point::new(120.0, 60.0),
            Point::new(100.0, 85.0),
            Point::new(85.0, 110.0),
            Point::new(115.0, 110.0),
        ];
        let aligned = align_face(&frame, &src);
        assert_eq!(aligned.get_pixel(56, 56).0, [200, 40, 10]);
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the source left eye should land near the
        // reference left eye after alignment.
        let mut img = RgbImage::new(200, 200);
        let src = [
            Point::new(80.0, 60.0),
            Point::new(120.0, 60.0),
            Point::new(100.0, 85.0),
            Point::new(85.0, 110.0),
            Point::new(115.0, 110.0),
        ];
        for y in 58..=62 {
            for x in 78..=82 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let aligned = align_face(&Frame::new(img, 0), &src);

        let rx = REFERENCE_LANDMARKS_112[0].x.round() as u32;
        let ry = REFERENCE_LANDMARKS_112[0].y.round() as u32;
        let max_val = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap_or(0);
        assert!(max_val > 100, "expected bright patch near ({rx}, {ry}), max={max_val}");
    }
}
