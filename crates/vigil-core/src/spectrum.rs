//! Frequency-domain analysis of grayscale regions.
//!
//! Two measurements come out of the centred magnitude spectrum:
//!
//! - the spread (`std`) of `ln(|F| + 1)` over the whole frame, a global
//!   texture cue for the depth/texture strategy;
//! - the peak of `20 ln(|F| + 1)` once a small disk around DC is zeroed. Screen
//!   refresh and moiré patterns from a replayed image put a strong off-centre
//!   peak into the spectrum of the face crop that live skin does not.

use image::GrayImage;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::signals::{ensure_analyzable, ExtractionError};

/// Reusable 2-D FFT front end. Plans are cached across frames.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

/// Centred (DC in the middle) magnitude spectrum, row-major.
struct Spectrum {
    width: usize,
    height: usize,
    magnitude: Vec<f64>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Standard deviation of the log-magnitude spectrum.
    pub fn spectrum_std(&mut self, gray: &GrayImage) -> Result<f64, ExtractionError> {
        ensure_analyzable(gray)?;
        let spectrum = self.magnitude_spectrum(gray);
        Ok(crate::landmarks::population_std(
            spectrum.magnitude.iter().map(|m| (m + 1.0).ln()),
        ))
    }

    /// Largest `20 ln(|F| + 1)` outside a disk of `dc_radius` px around DC.
    pub fn peak_after_dc(
        &mut self,
        gray: &GrayImage,
        dc_radius: u32,
    ) -> Result<f64, ExtractionError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(ExtractionError::EmptyCrop);
        }
        let spectrum = self.magnitude_spectrum(gray);
        let (cx, cy) = ((spectrum.width / 2) as i64, (spectrum.height / 2) as i64);
        let r2 = (dc_radius as i64).pow(2);

        let mut peak = 0.0f64;
        for y in 0..spectrum.height {
            let dy = y as i64 - cy;
            for x in 0..spectrum.width {
                let dx = x as i64 - cx;
                if dx * dx + dy * dy <= r2 {
                    continue;
                }
                let value = 20.0 * (spectrum.magnitude[y * spectrum.width + x] + 1.0).ln();
                peak = peak.max(value);
            }
        }
        Ok(peak)
    }

    fn magnitude_spectrum(&mut self, gray: &GrayImage) -> Spectrum {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let mut rows: Vec<Complex64> = gray
            .pixels()
            .map(|p| Complex64::new(p[0] as f64, 0.0))
            .collect();

        // Rows in place, then columns through a transposed copy.
        self.planner.plan_fft_forward(width).process(&mut rows);

        let mut cols = vec![Complex64::new(0.0, 0.0); width * height];
        for y in 0..height {
            for x in 0..width {
                cols[x * height + y] = rows[y * width + x];
            }
        }
        self.planner.plan_fft_forward(height).process(&mut cols);

        // Shift DC from (0, 0) to (width / 2, height / 2).
        let mut magnitude = vec![0.0; width * height];
        for x in 0..width {
            let sx = (x + width / 2) % width;
            for y in 0..height {
                let sy = (y + height / 2) % height;
                magnitude[sy * width + sx] = cols[x * height + y].norm();
            }
        }

        Spectrum {
            width,
            height,
            magnitude,
        }
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::tests::{checkerboard, uniform};
    use image::Luma;

    #[test]
    fn test_uniform_region_has_no_peak_off_dc() {
        let mut analyzer = SpectrumAnalyzer::new();
        let peak = analyzer.peak_after_dc(&uniform(32, 32, 200), 5).unwrap();
        assert!(peak < 1e-6, "peak = {peak}");
    }

    #[test]
    fn test_dc_is_masked() {
        // Uniform field: all energy sits at DC (32*32*200), nothing elsewhere.
        let mut analyzer = SpectrumAnalyzer::new();
        let with_mask = analyzer.peak_after_dc(&uniform(32, 32, 200), 5).unwrap();
        let without_mask = analyzer.peak_after_dc(&uniform(32, 32, 200), 0).unwrap();
        assert!(with_mask < 1e-6);
        assert!(without_mask < 1e-6, "radius 0 still masks the DC bin itself");
    }

    #[test]
    fn test_periodic_pattern_produces_peak() {
        // Vertical stripes with a 4 px period: a sharp off-centre spike at
        // width / 4 from DC, far outside the mask.
        let stripes = GrayImage::from_fn(64, 64, |x, _| {
            if (x / 2) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let mut analyzer = SpectrumAnalyzer::new();
        let peak = analyzer.peak_after_dc(&stripes, 5).unwrap();
        // |F| at the fundamental is a few hundred thousand.
        assert!(peak > 150.0, "peak = {peak}");
    }

    #[test]
    fn test_empty_crop() {
        let mut analyzer = SpectrumAnalyzer::new();
        let err = analyzer.peak_after_dc(&uniform(0, 0, 0), 5).unwrap_err();
        assert_eq!(err, ExtractionError::EmptyCrop);
    }

    #[test]
    fn test_spectrum_std_flat_vs_textured() {
        let mut analyzer = SpectrumAnalyzer::new();
        let flat = analyzer.spectrum_std(&uniform(32, 32, 100)).unwrap();
        let textured = analyzer.spectrum_std(&checkerboard(32, 32, 2)).unwrap();
        assert!(textured > 0.0);
        // A lone DC spike over an empty spectrum still has spread.
        assert!(flat > 0.0);
        assert!(analyzer.spectrum_std(&uniform(2, 2, 0)).is_err());
    }

    #[test]
    fn test_non_square_region() {
        let mut analyzer = SpectrumAnalyzer::new();
        let peak = analyzer.peak_after_dc(&checkerboard(40, 24, 3), 5).unwrap();
        assert!(peak.is_finite());
        assert!(peak > 0.0);
    }
}
