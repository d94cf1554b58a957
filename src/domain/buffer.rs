//! Decoded pixel buffers ready for inference.

use serde::{Deserialize, Serialize};

/// Sample layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB.
    #[default]
    Rgb8,
    /// 8-bit grayscale.
    Luma8,
}

impl PixelFormat {
    /// Number of bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }
}

/// A rasterized image owned by exactly one in-flight task.
///
/// The buffer is dropped as soon as the inference call that consumes it
/// returns, whatever the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    scale: f32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a buffer from raw samples.
    ///
    /// Returns `None` if the sample count does not match the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, samples: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.channels();
        if samples.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            format,
            scale: 1.0,
            samples,
        })
    }

    /// Records the factor applied when downscaling from the source image.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Ratio between buffer and source dimensions (1.0 when not downscaled).
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Raw sample data, row-major.
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Size of the sample data in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len()
    }
}
