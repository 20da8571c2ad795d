//! Per-frame signal extractors: gradient texture, edge/contour structure and
//! the snapshot record that carries every measured scalar to the caller.

use image::GrayImage;
use imageproc::contours::{find_contours, Contour};
use imageproc::point::Point;
use serde::Serialize;
use thiserror::Error;

/// Smallest side length the 3x3 gradient and frequency kernels accept.
pub const MIN_ANALYSIS_SIDE: u32 = 3;

/// Canny hysteresis thresholds.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Contours enclosing less than this many px² are ignored.
const MIN_CONTOUR_AREA: f64 = 1000.0;
/// Sigma equivalent to a 5x5 Gaussian kernel with automatic sigma.
const TEXTURE_BLUR_SIGMA: f32 = 1.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("region {width}x{height} is smaller than the {min}x{min} analysis kernel")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("landmark index {index} out of range for a set of {len} points")]
    MissingLandmark { index: usize, len: usize },
    #[error("face crop is empty after clamping to the frame")]
    EmptyCrop,
}

/// Outcome of one extractor call.
///
/// A failed extraction is never thrown across the classifier boundary: it
/// arrives as `Degraded` with the safe default the extractor chose.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Measured(T),
    Degraded { fallback: T, cause: ExtractionError },
}

impl<T: Copy> Extracted<T> {
    pub fn from_result(result: Result<T, ExtractionError>, fallback: T) -> Self {
        match result {
            Ok(value) => Extracted::Measured(value),
            Err(cause) => Extracted::Degraded { fallback, cause },
        }
    }

    pub fn value(&self) -> T {
        match self {
            Extracted::Measured(v) => *v,
            Extracted::Degraded { fallback, .. } => *fallback,
        }
    }

    pub fn cause(&self) -> Option<&ExtractionError> {
        match self {
            Extracted::Measured(_) => None,
            Extracted::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extracted::Degraded { .. })
    }
}

/// Every scalar extracted for one frame. Fields a strategy did not compute
/// stay `None`, so the snapshot doubles as the diagnostic trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalSnapshot {
    pub texture_std: Option<f64>,
    pub texture_mean: Option<f64>,
    pub freq_std: Option<f64>,
    pub edge_density: Option<f64>,
    pub contour_complexity: Option<f64>,
    pub motion_ratio: Option<f64>,
    pub fourier_peak: Option<f64>,
    pub z_std: Option<f64>,
    pub ear_mean: Option<f64>,
    pub ear_std: Option<f64>,
    pub head_move_std: Option<f64>,
    /// Raw grayscale spread, only set by the degraded fallback.
    pub intensity_std: Option<f64>,
}

pub(crate) fn ensure_analyzable(gray: &GrayImage) -> Result<(), ExtractionError> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(ExtractionError::EmptyFrame);
    }
    if width < MIN_ANALYSIS_SIDE || height < MIN_ANALYSIS_SIDE {
        return Err(ExtractionError::TooSmall {
            width,
            height,
            min: MIN_ANALYSIS_SIDE,
        });
    }
    Ok(())
}

/// Gradient-magnitude statistics `(std, mean)` after a light blur.
///
/// Real skin has fine texture that survives the blur; prints and screens
/// produce a flatter gradient field.
pub fn texture_stats(gray: &GrayImage) -> Result<(f64, f64), ExtractionError> {
    ensure_analyzable(gray)?;

    let blurred = imageproc::filter::gaussian_blur_f32(gray, TEXTURE_BLUR_SIGMA);
    let gx = imageproc::gradients::horizontal_sobel(&blurred);
    let gy = imageproc::gradients::vertical_sobel(&blurred);

    let magnitudes = gx.pixels().zip(gy.pixels()).map(|(x, y)| {
        let (x, y) = (x[0] as f64, y[0] as f64);
        (x * x + y * y).sqrt()
    });
    let n = (gray.width() * gray.height()) as f64;
    let mean = magnitudes.clone().sum::<f64>() / n;
    let variance = magnitudes.map(|m| (m - mean).powi(2)).sum::<f64>() / n;

    Ok((variance.sqrt(), mean))
}

/// Edge structure `(density, contour_complexity)`.
///
/// Density is the fraction of Canny edge pixels. Complexity is
/// perimeter / area of the largest outer contour, left at 0 when no outer
/// contour encloses more than [`MIN_CONTOUR_AREA`].
pub fn edge_stats(gray: &GrayImage) -> Result<(f64, f64), ExtractionError> {
    ensure_analyzable(gray)?;

    let edges = imageproc::edges::canny(gray, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
    let density = edge_pixels as f64 / (edges.width() * edges.height()) as f64;

    Ok((density, contour_complexity(&edges)))
}

/// Perimeter / area of the largest outer contour in a binary edge map.
fn contour_complexity(edges: &GrayImage) -> f64 {
    let contours: Vec<Contour<i32>> = find_contours(edges);
    let largest = contours
        .iter()
        .filter(|c| c.parent.is_none())
        .map(|c| (polygon_area(&c.points), c))
        .max_by(|a, b| a.0.total_cmp(&b.0));

    match largest {
        Some((area, contour)) if area > MIN_CONTOUR_AREA => {
            closed_perimeter(&contour.points) / area
        }
        _ => 0.0,
    }
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

fn closed_perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| ((a.x - b.x) as f64).hypot((a.y - b.y) as f64))
        .sum()
}

/// Population std of raw grayscale intensity, the last-resort liveness cue.
pub fn intensity_std(gray: &GrayImage) -> Result<f64, ExtractionError> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(ExtractionError::EmptyFrame);
    }
    Ok(crate::landmarks::population_std(
        gray.pixels().map(|p| p[0] as f64),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    pub(crate) fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    pub(crate) fn checkerboard(width: u32, height: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Luma([230])
            } else {
                Luma([20])
            }
        })
    }

    #[test]
    fn test_texture_flat_image() {
        let (std, mean) = texture_stats(&uniform(32, 32, 128)).unwrap();
        assert!(std < 1e-9);
        assert!(mean < 1e-9);
    }

    #[test]
    fn test_texture_checkerboard_has_gradient() {
        let (std, mean) = texture_stats(&checkerboard(64, 64, 4)).unwrap();
        assert!(mean > 10.0);
        assert!(std > 10.0);
    }

    #[test]
    fn test_texture_rejects_tiny_region() {
        let err = texture_stats(&uniform(2, 10, 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::TooSmall { width: 2, .. }));
        assert_eq!(
            texture_stats(&uniform(0, 0, 0)).unwrap_err(),
            ExtractionError::EmptyFrame
        );
    }

    #[test]
    fn test_edges_flat_image() {
        let (density, complexity) = edge_stats(&uniform(40, 40, 90)).unwrap();
        assert_eq!(density, 0.0);
        assert_eq!(complexity, 0.0);
    }

    #[test]
    fn test_edges_detected_on_checkerboard() {
        let (density, _) = edge_stats(&checkerboard(64, 64, 8)).unwrap();
        assert!(density > 0.05);
    }

    #[test]
    fn test_large_region_contour_complexity() {
        // 60x60 blob: border of roughly 236 px around ~3500 px²
        let img = GrayImage::from_fn(100, 100, |x, y| {
            if (20..80).contains(&x) && (20..80).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let complexity = contour_complexity(&img);
        assert!(complexity > 0.05);
        assert!(complexity < 0.1);
    }

    #[test]
    fn test_small_region_has_no_complexity() {
        let img = GrayImage::from_fn(100, 100, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        assert_eq!(contour_complexity(&img), 0.0);
    }

    #[test]
    fn test_polygon_area_and_perimeter() {
        let square = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(closed_perimeter(&square), 40.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_intensity_std() {
        assert_eq!(intensity_std(&uniform(4, 4, 7)).unwrap(), 0.0);
        let std = intensity_std(&checkerboard(4, 4, 1)).unwrap();
        assert!((std - 105.0).abs() < 1e-9);
        assert!(intensity_std(&uniform(0, 3, 0)).is_err());
    }

    #[test]
    fn test_extracted_value_and_cause() {
        let ok = Extracted::from_result(Ok(3.0), 0.0);
        assert_eq!(ok.value(), 3.0);
        assert!(ok.cause().is_none());

        let degraded = Extracted::from_result(Err(ExtractionError::EmptyCrop), 0.0);
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value(), 0.0);
        assert_eq!(degraded.cause(), Some(&ExtractionError::EmptyCrop));
    }
}
