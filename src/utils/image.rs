//! Image decoding into pixel buffers.
//!
//! This module provides [`ImageDecoder`], the default [`BufferDecoder`]. It
//! decodes any format supported by the `image` crate, downscales so that
//! neither side exceeds a maximum dimension while keeping the aspect ratio,
//! and extracts raw samples.

use crate::core::constants::DEFAULT_MAX_DIMENSION;
use crate::core::errors::DecodeError;
use crate::core::traits::BufferDecoder;
use crate::domain::{FileSource, InputFile, PixelBuffer, PixelFormat};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Decodes input files with the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    max_dimension: u32,
    filter: FilterType,
    format: PixelFormat,
}

impl ImageDecoder {
    /// Creates a decoder that caps both sides at `max_dimension` pixels.
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            filter: FilterType::Triangle,
            format: PixelFormat::Rgb8,
        }
    }

    /// Sets the resampling filter used when downscaling.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the sample layout of produced buffers.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// The maximum width or height of produced buffers.
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn open(&self, file: &InputFile) -> Result<DynamicImage, DecodeError> {
        let decoded = match file.source() {
            FileSource::Path(path) => ImageReader::open(path)
                .map_err(|e| DecodeError::new(file.name(), e))?
                .with_guessed_format()
                .map_err(|e| DecodeError::new(file.name(), e))?
                .decode(),
            FileSource::Memory(bytes) => ImageReader::new(Cursor::new(&bytes[..]))
                .with_guessed_format()
                .map_err(|e| DecodeError::new(file.name(), e))?
                .decode(),
        };
        decoded.map_err(|e| DecodeError::new(file.name(), e))
    }

    fn rasterize(&self, image: DynamicImage) -> (u32, u32, Vec<u8>) {
        match self.format {
            PixelFormat::Rgb8 => {
                let raster = image.into_rgb8();
                let (width, height) = raster.dimensions();
                (width, height, raster.into_raw())
            }
            PixelFormat::Luma8 => {
                let raster = image.into_luma8();
                let (width, height) = raster.dimensions();
                (width, height, raster.into_raw())
            }
        }
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl BufferDecoder for ImageDecoder {
    fn decode(&self, file: &InputFile) -> Result<PixelBuffer, DecodeError> {
        let source = self.open(file)?;
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::with_message(
                file.name(),
                format!("image has empty dimensions {width}x{height}"),
            ));
        }

        let (target_w, target_h, scale) = downscale_dimensions(width, height, self.max_dimension);
        let scaled = if (target_w, target_h) == (width, height) {
            source
        } else {
            tracing::debug!(
                "Downscaling '{}' from {}x{} to {}x{}",
                file.name(),
                width,
                height,
                target_w,
                target_h
            );
            let resized = source.resize_exact(target_w, target_h, self.filter);
            drop(source);
            resized
        };

        let (width, height, samples) = self.rasterize(scaled);
        PixelBuffer::new(width, height, self.format, samples)
            .map(|buffer| buffer.with_scale(scale))
            .ok_or_else(|| {
                DecodeError::with_message(file.name(), "rasterized sample count mismatch")
            })
    }
}

/// Computes dimensions that fit within `max_dimension` on both sides.
///
/// Returns `(width, height, scale)`. Images already within bounds keep their
/// size and a scale of 1.0; otherwise the longer side becomes `max_dimension`
/// and the shorter side is rounded, never below one pixel.
pub fn downscale_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32, f32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return (width, height, 1.0);
    }

    let scale = max_dimension as f32 / longest as f32;
    let scaled = |side: u32| ((side as f32 * scale).round() as u32).clamp(1, max_dimension);
    (scaled(width), scaled(height), scale)
}
