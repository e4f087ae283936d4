//! Captured frames.
//!
//! Every source hands the monitor an owned RGB image plus the wall-clock time
//! it was captured. Frames are normalised to the working resolution before
//! detection so boxes, zone coordinates, and overlays share one pixel space.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::imageops::FilterType;
use image::RgbImage;

pub struct Frame {
    pub image: RgbImage,
    /// 1-based position in the stream.
    pub index: u64,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: Local::now(),
        }
    }

    /// Wrap packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Local>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Rescale in place to `width` x `height`. No-op when already that size.
    pub fn resize_to(&mut self, width: u32, height: u32) {
        if self.image.width() == width && self.image.height() == height {
            return;
        }
        self.image = image::imageops::resize(&self.image, width, height, FilterType::Triangle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_checks_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
        let frame = Frame::from_rgb(vec![7u8; 12], 2, 2, 1).expect("frame");
        assert_eq!((frame.width(), frame.height()), (2, 2));
        assert_eq!(frame.image.get_pixel(1, 1).0, [7, 7, 7]);
    }

    #[test]
    fn resize_to_working_resolution() {
        let mut frame = Frame::new(RgbImage::new(1280, 720), 3);
        frame.resize_to(640, 480);
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(frame.index, 3);
    }
}
