//! Downscale and re-encode a photo as JPEG until it fits the size budget.

use std::fs;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};

use crate::config::{CompressionConfig, RetryPolicy};
use crate::error::Result;
use crate::ingest::retry::with_retry;

/// One encode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionAttempt {
    pub quality: u8,
    pub size_bytes: u64,
}

/// Outcome of `compress`: final dimensions and every encode pass in order
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub width: u32,
    pub height: u32,
    pub attempts: Vec<CompressionAttempt>,
}

impl CompressionReport {
    /// Size of the file left at the destination
    pub fn final_size(&self) -> u64 {
        self.attempts.last().map(|a| a.size_bytes).unwrap_or(0)
    }

    pub fn final_quality(&self) -> Option<u8> {
        self.attempts.last().map(|a| a.quality)
    }
}

/// Output dimensions: width capped at `max_width`, aspect ratio preserved.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(image)?;
    Ok(buf)
}

/// A photo decoded, downscaled and encoded once, not written anywhere yet.
///
/// Building one touches only the source, so callers can do all the CPU work
/// before clearing the destination.
#[derive(Debug)]
pub struct EncodedPhoto {
    image: RgbImage,
    quality: u8,
    bytes: Vec<u8>,
}

impl EncodedPhoto {
    /// Decode `source`, drop alpha, cap the width and run the first encode.
    pub fn from_source(source: &Path, config: &CompressionConfig) -> Result<Self> {
        let decoded = ImageReader::open(source)?.with_guessed_format()?.decode()?;
        let mut image = decoded.to_rgb8();

        let (width, height) = target_dimensions(image.width(), image.height(), config.max_width);
        if width != image.width() {
            image = imageops::resize(&image, width, height, FilterType::Lanczos3);
        }

        let bytes = encode_jpeg(&image, config.initial_quality)?;
        log::debug!(
            "{} encoded at {}x{}, quality {}: {} bytes",
            source.display(),
            width,
            height,
            config.initial_quality,
            bytes.len()
        );

        Ok(Self {
            image,
            quality: config.initial_quality,
            bytes,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Write to `dest`, re-encoding at lower quality until the file fits.
    ///
    /// Every pass overwrites `dest`; the loop ends when the file fits
    /// `max_size_kb`, when quality already sits at the floor, or after
    /// `max_iterations` passes. Writes that fail are retried per `write_retry`.
    pub fn write(
        self,
        dest: &Path,
        config: &CompressionConfig,
        write_retry: RetryPolicy,
    ) -> Result<CompressionReport> {
        let (width, height) = self.dimensions();
        let budget = config.max_size_kb * 1024;
        let max_passes = config.max_iterations.max(1) as usize;
        let mut quality = self.quality;
        let mut bytes = self.bytes;
        let mut attempts = Vec::with_capacity(max_passes);

        loop {
            let size_bytes = with_retry(dest, write_retry, "Writing", || {
                fs::write(dest, &bytes)?;
                fs::metadata(dest).map(|m| m.len())
            })?;
            attempts.push(CompressionAttempt {
                quality,
                size_bytes,
            });

            if size_bytes <= budget || quality <= config.min_quality || attempts.len() >= max_passes {
                break;
            }
            quality = quality
                .saturating_sub(config.quality_step)
                .max(config.min_quality);
            bytes = encode_jpeg(&self.image, quality)?;
        }

        log::debug!(
            "{} written ({}x{}, {} passes, {} bytes)",
            dest.display(),
            width,
            height,
            attempts.len(),
            attempts.last().map(|a| a.size_bytes).unwrap_or(0)
        );

        Ok(CompressionReport {
            width,
            height,
            attempts,
        })
    }
}

/// Compress `source` into `dest` in one go.
pub fn compress(
    source: &Path,
    dest: &Path,
    config: &CompressionConfig,
    write_retry: RetryPolicy,
) -> Result<CompressionReport> {
    EncodedPhoto::from_source(source, config)?.write(dest, config, write_retry)
}
