//! Immutable video frame with a grayscale plane derived once at construction.

use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("raw buffer has {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// One colour frame from the camera.
///
/// Every extractor works on luminance, so the grayscale conversion happens
/// once here instead of once per signal.
#[derive(Debug, Clone)]
pub struct Frame {
    rgb: RgbImage,
    gray: GrayImage,
}

impl Frame {
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let gray = image::imageops::grayscale(&rgb);
        Self { rgb, gray }
    }

    /// Build a frame from a packed, row-major RGB8 buffer.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        let rgb = RgbImage::from_raw(width, height, data).ok_or(FrameError::BufferSize {
            width,
            height,
            expected,
            actual,
        })?;
        if actual != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual,
            });
        }
        Ok(Self::from_rgb(rgb))
    }

    /// Decode an image file (PNG or JPEG) into a frame.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let rgb = image::open(path)?.to_rgb8();
        Ok(Self::from_rgb(rgb))
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Colour pixels, for cropping the face before embedding extraction.
    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Copy out the grayscale pixels inside `region`. The region must already
    /// be clamped to the frame.
    pub fn gray_crop(&self, region: &BoundingBox) -> GrayImage {
        image::imageops::crop_imm(&self.gray, region.x, region.y, region.width, region.height)
            .to_image()
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        let err = Frame::from_raw(4, 4, vec![0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferSize {
                expected: 48,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_from_raw_rejects_long_buffer() {
        let err = Frame::from_raw(2, 2, vec![0u8; 13]).unwrap_err();
        assert!(matches!(err, FrameError::BufferSize { actual: 13, .. }));
    }

    #[test]
    fn test_raw_buffer_kept_as_colour() {
        let frame = Frame::from_raw(2, 1, vec![255, 0, 0, 0, 0, 255]).unwrap();
        assert_eq!(frame.rgb().dimensions(), (2, 1));
        assert_eq!(frame.rgb().get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(frame.rgb().get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_grayscale_derived_once() {
        let frame = Frame::from_raw(2, 1, vec![255, 255, 255, 0, 0, 0]).unwrap();
        assert_eq!(frame.gray().get_pixel(0, 0)[0], 255);
        assert_eq!(frame.gray().get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_gray_crop_dimensions() {
        let frame = Frame::from_rgb(RgbImage::new(20, 10));
        let crop = frame.gray_crop(&BoundingBox {
            x: 5,
            y: 2,
            width: 10,
            height: 6,
        });
        assert_eq!(crop.dimensions(), (10, 6));
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::from_rgb(RgbImage::new(0, 0));
        assert!(frame.is_empty());
    }
}
