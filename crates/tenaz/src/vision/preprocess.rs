//! Frame normalization for the visual pipeline.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

use crate::config::VisualConfig;
use crate::locator::BoundingBox;

/// A grayscale, denoised and possibly downscaled frame
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    /// Normalized pixels
    pub gray: GrayImage,
    /// Normalized width divided by original width (1.0 when not resized)
    pub scale: f32,
}

impl NormalizedFrame {
    /// Map a box from normalized coordinates back to frame coordinates
    #[must_use]
    pub fn to_frame_coords(&self, bounds: BoundingBox) -> BoundingBox {
        if (self.scale - 1.0).abs() < f32::EPSILON {
            bounds
        } else {
            bounds.scaled(1.0 / self.scale)
        }
    }

    /// Map a box from frame coordinates into normalized coordinates
    #[must_use]
    pub fn to_normalized_coords(&self, bounds: BoundingBox) -> BoundingBox {
        bounds.scaled(self.scale)
    }

    /// Normalized frame width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    /// Normalized frame height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Stateless frame normalizer: grayscale, mild Gaussian denoise, and a
/// downscale for frames wider than the configured maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePreprocessor {
    denoise_sigma: f32,
    max_width: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::from_config(&VisualConfig::default())
    }
}

impl ImagePreprocessor {
    /// Create a preprocessor
    #[must_use]
    pub const fn new(denoise_sigma: f32, max_width: u32) -> Self {
        Self {
            denoise_sigma,
            max_width,
        }
    }

    /// Create a preprocessor from the visual config
    #[must_use]
    pub fn from_config(config: &VisualConfig) -> Self {
        Self::new(config.denoise_sigma, config.max_frame_width)
    }

    /// Normalize a captured frame. Same input, same output.
    #[must_use]
    pub fn normalize(&self, frame: &DynamicImage) -> NormalizedFrame {
        let gray = frame.to_luma8();
        let (width, height) = gray.dimensions();

        let (gray, scale) = if self.max_width > 0 && width > self.max_width {
            let scale = self.max_width as f32 / width as f32;
            let new_height = ((height as f32 * scale).round() as u32).max(1);
            (
                imageops::resize(&gray, self.max_width, new_height, FilterType::Triangle),
                scale,
            )
        } else {
            (gray, 1.0)
        };

        NormalizedFrame {
            gray: self.denoise(gray),
            scale,
        }
    }

    /// Normalize a reference image so it can be compared against frames
    /// produced by [`normalize`](Self::normalize) at `scale`
    #[must_use]
    pub fn normalize_reference(&self, reference: &DynamicImage, scale: f32) -> GrayImage {
        let gray = reference.to_luma8();
        let gray = if (scale - 1.0).abs() < f32::EPSILON {
            gray
        } else {
            let width = ((gray.width() as f32 * scale).round() as u32).max(1);
            let height = ((gray.height() as f32 * scale).round() as u32).max(1);
            imageops::resize(&gray, width, height, FilterType::Triangle)
        };
        self.denoise(gray)
    }

    fn denoise(&self, gray: GrayImage) -> GrayImage {
        // imageops::blur underflows on a zero-sized buffer
        if self.denoise_sigma > 0.0 && gray.width() > 0 && gray.height() > 0 {
            imageops::blur(&gray, self.denoise_sigma)
        } else {
            gray
        }
    }
}
