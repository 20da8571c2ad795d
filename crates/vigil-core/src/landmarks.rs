//! Facial landmark geometry: eye-aspect-ratio, depth spread and face crops.
//!
//! Landmarks come from an external 468-point mesh model. `x`/`y` are in
//! pixel space, `z` is the model's relative depth estimate (smaller is
//! closer to the camera). Only the indices below are interpreted; the rest
//! of the mesh contributes to the depth spread and the bounding box.

use crate::frame::{BoundingBox, Frame};
use crate::signals::ExtractionError;
use serde::{Deserialize, Serialize};

/// Number of points produced by the mesh model.
pub const MESH_POINT_COUNT: usize = 468;

/// Left eye contour, ordered p0..p5 for the EAR formula.
pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
/// Right eye contour, ordered p0..p5 for the EAR formula.
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// Nose tip; its depth drives the head-motion history.
pub const NOSE_TIP: usize = 1;

/// A single landmark. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn planar_distance(&self, other: &Point3) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f64; 3]> for Point3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

/// One face's landmarks, or nothing when no face was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point3>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Result<Point3, ExtractionError> {
        self.points
            .get(index)
            .copied()
            .ok_or(ExtractionError::MissingLandmark {
                index,
                len: self.points.len(),
            })
    }

    /// Select the six contour points of one eye.
    pub fn eye(&self, indices: &[usize; 6]) -> Result<EyeLandmarks, ExtractionError> {
        let mut points = [Point3::new(0.0, 0.0, 0.0); 6];
        for (slot, &index) in points.iter_mut().zip(indices) {
            *slot = self.point(index)?;
        }
        Ok(EyeLandmarks(points))
    }

    /// Mean EAR of both eyes.
    pub fn mean_ear(&self) -> Result<f64, ExtractionError> {
        let left = self.eye(&LEFT_EYE)?.aspect_ratio();
        let right = self.eye(&RIGHT_EYE)?.aspect_ratio();
        Ok((left + right) / 2.0)
    }

    /// Population standard deviation of `z` across the whole mesh.
    ///
    /// A photo or screen is a plane, so the mesh model's depth estimates
    /// collapse toward a constant.
    pub fn depth_std(&self) -> f64 {
        population_std(self.points.iter().map(|p| p.z))
    }

    /// Tight box around the landmark extrema, clamped to the frame.
    pub fn bounding_box(&self, frame: &Frame) -> Option<BoundingBox> {
        self.padded_box(frame, 0)
    }

    /// Landmark extrema padded by `padding` pixels per side, clamped to the
    /// frame. `None` when the region is empty after clamping.
    pub fn padded_box(&self, frame: &Frame, padding: u32) -> Option<BoundingBox> {
        if self.points.is_empty() {
            return None;
        }
        let (mut xmin, mut ymin) = (f64::INFINITY, f64::INFINITY);
        let (mut xmax, mut ymax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.points {
            xmin = xmin.min(p.x);
            xmax = xmax.max(p.x);
            ymin = ymin.min(p.y);
            ymax = ymax.max(p.y);
        }
        if !(xmin.is_finite() && xmax.is_finite() && ymin.is_finite() && ymax.is_finite()) {
            return None;
        }

        // Truncate like an integer pixel index, then pad and clamp.
        let pad = padding as i64;
        let x0 = (xmin as i64 - pad).max(0);
        let y0 = (ymin as i64 - pad).max(0);
        let x1 = (xmax as i64 + pad).min(frame.width() as i64);
        let y1 = (ymax as i64 + pad).min(frame.height() as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(BoundingBox {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Six ordered eye-contour points: p0/p3 are the corners, (p1, p5) and
/// (p2, p4) the vertical pairs.
#[derive(Debug, Clone, Copy)]
pub struct EyeLandmarks(pub [Point3; 6]);

impl EyeLandmarks {
    /// EAR = (|p1-p5| + |p2-p4|) / (2 |p0-p3|), in the image plane.
    pub fn aspect_ratio(&self) -> f64 {
        let p = &self.0;
        let horizontal = p[0].planar_distance(&p[3]);
        if horizontal <= 0.0 {
            return 0.0;
        }
        let v1 = p[1].planar_distance(&p[5]);
        let v2 = p[2].planar_distance(&p[4]);
        (v1 + v2) / (2.0 * horizontal)
    }
}

/// Produces landmarks for a frame. Implemented outside the core (mesh model,
/// recorded session, ...). Returns an empty set when no face is visible.
pub trait LandmarkExtractor {
    fn extract(&mut self, frame: &Frame) -> LandmarkSet;
}

pub(crate) fn population_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (sum, n) = values.clone().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn eye(width: f64, height: f64) -> EyeLandmarks {
        EyeLandmarks([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(width / 3.0, -height / 2.0, 0.0),
            Point3::new(2.0 * width / 3.0, -height / 2.0, 0.0),
            Point3::new(width, 0.0, 0.0),
            Point3::new(2.0 * width / 3.0, height / 2.0, 0.0),
            Point3::new(width / 3.0, height / 2.0, 0.0),
        ])
    }

    #[test]
    fn test_ear_known_geometry() {
        // Both vertical pairs span 9 px over a 30 px wide eye → 0.3
        assert!((eye(30.0, 9.0).aspect_ratio() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_ear_zero_width_eye() {
        assert_eq!(eye(0.0, 9.0).aspect_ratio(), 0.0);
    }

    #[test]
    fn test_ear_ignores_depth() {
        let mut e = eye(30.0, 9.0);
        e.0[1].z = 50.0;
        assert!((e.aspect_ratio() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_mean_ear_requires_full_mesh() {
        let set = LandmarkSet::new(vec![Point3::new(1.0, 1.0, 0.0); 10]);
        let err = set.mean_ear().unwrap_err();
        assert!(matches!(err, ExtractionError::MissingLandmark { len: 10, .. }));
    }

    #[test]
    fn test_depth_std() {
        let set = LandmarkSet::new(vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 3.0),
        ]);
        assert!((set.depth_std() - 1.0).abs() < 1e-12);
        assert_eq!(LandmarkSet::empty().depth_std(), 0.0);
    }

    #[test]
    fn test_padded_box_clamps_to_frame() {
        let frame = Frame::from_rgb(RgbImage::new(100, 80));
        let set = LandmarkSet::new(vec![
            Point3::new(5.5, 3.2, 0.0),
            Point3::new(95.9, 60.0, 0.0),
        ]);
        let bbox = set.padded_box(&frame, 10).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                x: 0,
                y: 0,
                width: 100,
                height: 70
            }
        );
        let tight = set.bounding_box(&frame).unwrap();
        assert_eq!((tight.x, tight.y, tight.width, tight.height), (5, 3, 90, 57));
    }

    #[test]
    fn test_padded_box_outside_frame() {
        let frame = Frame::from_rgb(RgbImage::new(50, 50));
        let set = LandmarkSet::new(vec![Point3::new(200.0, 200.0, 0.0)]);
        assert!(set.padded_box(&frame, 10).is_none());
        assert!(LandmarkSet::empty().bounding_box(&frame).is_none());
    }

    #[test]
    fn test_serde_point_as_triple() {
        let set: LandmarkSet = serde_json::from_str("[[1.0, 2.0, -0.5]]").unwrap();
        assert_eq!(set.point(0).unwrap(), Point3::new(1.0, 2.0, -0.5));
        assert_eq!(serde_json::to_string(&set).unwrap(), "[[1.0,2.0,-0.5]]");
    }
}
