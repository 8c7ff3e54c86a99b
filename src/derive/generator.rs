//! Thumbnail and binary image generation.
//!
//! # Design Decisions
//!
//! - **Fit within a box**: each requested size bounds the longest edge. Aspect
//!   ratio is preserved and images are never upscaled; a source that already
//!   fits is re-encoded at its own size.
//!
//! - **Same format out**: PNG sources produce PNG derivatives, JPEG sources
//!   produce JPEG derivatives at the configured quality.
//!
//! - **Bounded work**: decode/encode runs on the blocking pool under a timeout,
//!   so a pathological image surfaces as a request failure instead of a hang.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GenericImageView, ImageReader};

use super::format::SourceFormat;
use crate::error::DerivationError;
use crate::tier::ThumbnailSizes;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Default processing budget per derivation.
pub const DEFAULT_DERIVATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Encoded thumbnails for one upload.
#[derive(Debug, Clone)]
pub struct DerivedThumbnails {
    pub primary: Bytes,

    /// Present only when a secondary size was requested
    pub secondary: Option<Bytes>,
}

/// Produces thumbnails and binary variants from PNG/JPEG sources.
///
/// # Example
///
/// ```ignore
/// use pixhost::derive::{DerivativeGenerator, SourceFormat};
/// use pixhost::tier::ThumbnailSizes;
///
/// let generator = DerivativeGenerator::new();
/// let sizes = ThumbnailSizes { primary: 400, secondary: Some(200) };
/// let thumbs = generator.derive_thumbnails(bytes, SourceFormat::Png, sizes).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DerivativeGenerator {
    jpeg_quality: u8,
    timeout: Duration,
}

impl Default for DerivativeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DerivativeGenerator {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            timeout: DEFAULT_DERIVATION_TIMEOUT,
        }
    }

    /// Set the JPEG output quality (clamped to 1-100).
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = clamp_quality(quality);
        self
    }

    /// Set the processing budget per derivation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Derive the thumbnails requested by `sizes` on the blocking pool.
    pub async fn derive_thumbnails(
        &self,
        source: Bytes,
        format: SourceFormat,
        sizes: ThumbnailSizes,
    ) -> Result<DerivedThumbnails, DerivationError> {
        let this = self.clone();
        self.run_bounded(move || this.derive_thumbnails_blocking(&source, format, sizes))
            .await
    }

    /// Derive the dithered black/white variant on the blocking pool.
    pub async fn derive_binary(
        &self,
        source: Bytes,
        format: SourceFormat,
    ) -> Result<Bytes, DerivationError> {
        let this = self.clone();
        self.run_bounded(move || this.derive_binary_blocking(&source, format))
            .await
    }

    /// Synchronous thumbnail derivation.
    pub fn derive_thumbnails_blocking(
        &self,
        source: &[u8],
        format: SourceFormat,
        sizes: ThumbnailSizes,
    ) -> Result<DerivedThumbnails, DerivationError> {
        let img = decode(source, format)?;

        let primary = self.encode(&fit_within(&img, sizes.primary), format)?;
        let secondary = match sizes.secondary {
            Some(size) => Some(self.encode(&fit_within(&img, size), format)?),
            None => None,
        };

        Ok(DerivedThumbnails { primary, secondary })
    }

    /// Synchronous binary derivation: grayscale, Floyd-Steinberg dithered to
    /// pure black and white.
    pub fn derive_binary_blocking(
        &self,
        source: &[u8],
        format: SourceFormat,
    ) -> Result<Bytes, DerivationError> {
        let img = decode(source, format)?;

        let mut gray = img.to_luma8();
        imageops::dither(&mut gray, &BiLevel);

        self.encode(&DynamicImage::ImageLuma8(gray), format)
    }

    fn encode(&self, img: &DynamicImage, format: SourceFormat) -> Result<Bytes, DerivationError> {
        let mut output = Vec::new();

        let result = match format {
            SourceFormat::Png => img.write_with_encoder(PngEncoder::new(&mut output)),
            SourceFormat::Jpeg => {
                // JPEG has no alpha channel
                let opaque = match img {
                    DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
                    other => DynamicImage::ImageRgb8(other.to_rgb8()),
                };
                opaque.write_with_encoder(JpegEncoder::new_with_quality(
                    &mut output,
                    self.jpeg_quality,
                ))
            }
        };

        result.map_err(|e| {
            DerivationError::unsupported(format!("could not encode {} image: {}", format, e))
        })?;

        Ok(Bytes::from(output))
    }

    async fn run_bounded<T, F>(&self, work: F) -> Result<T, DerivationError>
    where
        F: FnOnce() -> Result<T, DerivationError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DerivationError::unsupported(format!(
                "image processing aborted: {}",
                join_err
            ))),
            Err(_) => Err(DerivationError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

fn decode(source: &[u8], format: SourceFormat) -> Result<DynamicImage, DerivationError> {
    if source.is_empty() {
        return Err(DerivationError::unsupported("empty image data"));
    }

    ImageReader::with_format(Cursor::new(source), format.image_format())
        .decode()
        .map_err(|e| DerivationError::unsupported(format!("could not decode {} image: {}", format, e)))
}

/// Scale down so the longest edge is at most `bound`; never scale up.
fn fit_within(img: &DynamicImage, bound: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width.max(height) <= bound {
        return img.clone();
    }
    img.resize(bound, bound, FilterType::Lanczos3)
}

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
