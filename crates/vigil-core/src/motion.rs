//! Running per-pixel Gaussian background model.
//!
//! Each pixel keeps a mean and variance updated with an exponential learning
//! rate (`1 / frames`, floored at `1 / HISTORY`). A pixel is foreground when
//! its squared distance to the mean exceeds `VAR_THRESHOLD` variances. The
//! per-frame output is the foreground fraction: a live subject produces a
//! small, non-zero ratio; a photo held still produces almost none, and a
//! hand-waved print or a cut to another scene produces far too much.

use image::GrayImage;

use crate::signals::ExtractionError;

/// Frames after which the learning rate stops decaying.
const HISTORY: u32 = 500;
/// Squared Mahalanobis distance separating foreground from background.
const VAR_THRESHOLD: f32 = 16.0;
const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

#[derive(Debug, Clone, Default)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames: u32,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames absorbed since construction or the last reset.
    pub fn frames_observed(&self) -> u32 {
        self.frames
    }

    /// Drop every learned statistic.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Classify `gray` against the model, then fold it in. Returns the
    /// fraction of foreground pixels.
    ///
    /// The first frame, and any frame whose size differs from the model,
    /// re-seeds the model and reports no motion.
    pub fn apply(&mut self, gray: &GrayImage) -> Result<f64, ExtractionError> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractionError::EmptyFrame);
        }

        if self.frames == 0 || (width, height) != (self.width, self.height) {
            if self.frames > 0 {
                tracing::debug!(
                    old_width = self.width,
                    old_height = self.height,
                    width,
                    height,
                    "frame size changed, re-seeding background model"
                );
            }
            self.seed(gray);
            return Ok(0.0);
        }

        self.frames = self.frames.saturating_add(1);
        let alpha = 1.0 / self.frames.min(HISTORY) as f32;

        let mut foreground = 0usize;
        for ((pixel, mean), variance) in gray
            .pixels()
            .zip(self.mean.iter_mut())
            .zip(self.variance.iter_mut())
        {
            let value = pixel[0] as f32;
            let diff = value - *mean;
            let d2 = diff * diff;
            if d2 > VAR_THRESHOLD * *variance {
                foreground += 1;
            }
            *mean += alpha * diff;
            *variance = (*variance + alpha * (d2 - *variance)).clamp(VAR_MIN, VAR_MAX);
        }

        Ok(foreground as f64 / (width as f64 * height as f64))
    }

    fn seed(&mut self, gray: &GrayImage) {
        self.width = gray.width();
        self.height = gray.height();
        self.mean = gray.pixels().map(|p| p[0] as f32).collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::tests::uniform;
    use image::Luma;

    #[test]
    fn test_first_frame_reports_no_motion() {
        let mut model = BackgroundModel::new();
        assert_eq!(model.apply(&uniform(16, 16, 100)).unwrap(), 0.0);
        assert_eq!(model.frames_observed(), 1);
    }

    #[test]
    fn test_static_scene_has_no_foreground() {
        let mut model = BackgroundModel::new();
        for _ in 0..10 {
            assert_eq!(model.apply(&uniform(16, 16, 100)).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_moving_block_is_foreground() {
        let mut model = BackgroundModel::new();
        for _ in 0..5 {
            model.apply(&uniform(20, 20, 50)).unwrap();
        }
        // A 10x10 bright patch appears: a quarter of the frame.
        let frame = GrayImage::from_fn(20, 20, |x, y| {
            if x < 10 && y < 10 {
                Luma([250])
            } else {
                Luma([50])
            }
        });
        let ratio = model.apply(&frame).unwrap();
        assert!((ratio - 0.25).abs() < 1e-9, "ratio = {ratio}");
    }

    #[test]
    fn test_reset_forgets_scene() {
        let mut model = BackgroundModel::new();
        for _ in 0..5 {
            model.apply(&uniform(8, 8, 10)).unwrap();
        }
        model.reset();
        assert_eq!(model.frames_observed(), 0);
        // After reset the new scene is seeded, not compared to the old one.
        assert_eq!(model.apply(&uniform(8, 8, 240)).unwrap(), 0.0);
    }

    #[test]
    fn test_size_change_reseeds() {
        let mut model = BackgroundModel::new();
        model.apply(&uniform(8, 8, 10)).unwrap();
        model.apply(&uniform(8, 8, 10)).unwrap();
        assert_eq!(model.apply(&uniform(12, 8, 240)).unwrap(), 0.0);
        assert_eq!(model.frames_observed(), 1);
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let mut model = BackgroundModel::new();
        assert!(model.apply(&uniform(0, 4, 0)).is_err());
    }
}
