//! Tile encoder.
//!
//! Encodes cropped tiles into their output image format.
//!
//! # Design Decisions
//!
//! - **One format per run**: every tile of a pyramid is encoded the same way,
//!   so the encoder is configured once and shared by all workers.
//!
//! - **Quality control**: JPEG and lossy WebP quality is configurable,
//!   trading file size against image quality. PNG and lossless WebP ignore it.
//!
//! - **No alpha in JPEG**: tiles are flattened to RGB before JPEG encoding.
//!
//! - **Lossy WebP via libwebp**: the `image` crate only writes lossless WebP,
//!   so lossy tiles go through the `webp` bindings.

use bytes::Bytes;
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder};
use webp::Encoder as LossyWebPEncoder;

use crate::error::TileWriteError;

/// Default JPEG and lossy WebP quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Output format of the encoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TileFormat {
    /// Lossy JPEG, honours the quality setting
    Jpeg,
    /// Lossless PNG
    Png,
    /// Lossy WebP, honours the quality setting
    #[default]
    Webp,
    /// Lossless WebP
    WebpLossless,
}

impl TileFormat {
    /// File extension used for tiles of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
            TileFormat::Webp | TileFormat::WebpLossless => "webp",
        }
    }

    /// Whether the quality setting has any effect on this format.
    pub fn uses_quality(&self) -> bool {
        matches!(self, TileFormat::Jpeg | TileFormat::Webp)
    }
}

// =============================================================================
// Tile Encoder
// =============================================================================

/// Encoder turning cropped tiles into image files.
///
/// # Example
///
/// ```
/// use image::{DynamicImage, RgbImage};
/// use pyramid_tiler::tile::{TileEncoder, TileFormat};
///
/// let encoder = TileEncoder::new(TileFormat::Jpeg, 85);
/// let tile = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
///
/// let bytes = encoder.encode(&tile).unwrap();
/// assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    format: TileFormat,
    quality: u8,
}

impl TileEncoder {
    /// Create an encoder; quality is clamped to 1-100.
    pub fn new(format: TileFormat, quality: u8) -> Self {
        Self {
            format,
            quality: clamp_quality(quality),
        }
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a tile.
    ///
    /// # Errors
    ///
    /// Returns [`TileWriteError::Encode`] if the codec rejects the image.
    pub fn encode(&self, tile: &DynamicImage) -> Result<Bytes, TileWriteError> {
        let mut output = Vec::new();

        let result = match self.format {
            TileFormat::Jpeg => {
                let rgb = tile.to_rgb8();
                JpegEncoder::new_with_quality(&mut output, self.quality).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )
            }
            TileFormat::Png => tile.write_with_encoder(PngEncoder::new(&mut output)),
            TileFormat::Webp => return encode_lossy_webp(tile, self.quality),
            TileFormat::WebpLossless => {
                let rgba = tile.to_rgba8();
                WebPEncoder::new_lossless(&mut output).write_image(
                    rgba.as_raw(),
                    rgba.width(),
                    rgba.height(),
                    image::ExtendedColorType::Rgba8,
                )
            }
        };

        result.map_err(|e| TileWriteError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(TileFormat::default(), DEFAULT_JPEG_QUALITY)
    }
}

/// Lossy WebP through libwebp. Tiles without alpha are sent as RGB.
fn encode_lossy_webp(tile: &DynamicImage, quality: u8) -> Result<Bytes, TileWriteError> {
    let memory = if tile.color().has_alpha() {
        let rgba = tile.to_rgba8();
        LossyWebPEncoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
            .encode_simple(false, quality as f32)
    } else {
        let rgb = tile.to_rgb8();
        LossyWebPEncoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
            .encode_simple(false, quality as f32)
    };

    let memory = memory.map_err(|e| TileWriteError::Encode {
        message: format!("webp: {:?}", e),
    })?;

    Ok(Bytes::copy_from_slice(&memory))
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
