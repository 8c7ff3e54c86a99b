//! Source format detection.
//!
//! Only PNG and JPEG are accepted. The format is chosen from the uploaded
//! file's extension (case-insensitive); the bytes must then decode as that
//! format, which the generator checks.

use std::fmt;

use image::ImageFormat;

use crate::error::DerivationError;

/// Supported image formats. Derivatives keep the source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Png,
    Jpeg,
}

impl SourceFormat {
    /// Detect the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, DerivationError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                DerivationError::unsupported(format!("'{}' has no file extension", name))
            })?;

        match ext.as_str() {
            "png" => Ok(SourceFormat::Png),
            "jpg" | "jpeg" => Ok(SourceFormat::Jpeg),
            other => Err(DerivationError::unsupported(format!(
                "'.{}' files are not supported (only PNG and JPEG)",
                other
            ))),
        }
    }

    /// Stable name used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Png => "png",
            SourceFormat::Jpeg => "jpeg",
        }
    }

    /// Inverse of [`SourceFormat::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "png" => Some(SourceFormat::Png),
            "jpeg" => Some(SourceFormat::Jpeg),
            _ => None,
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Png => "png",
            SourceFormat::Jpeg => "jpg",
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            SourceFormat::Png => "image/png",
            SourceFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            SourceFormat::Png => ImageFormat::Png,
            SourceFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a derivative's file name from the source name: `cat.PNG` with suffix
/// `_binary` becomes `cat_binary.PNG`.
pub fn derivative_name(source_name: &str, suffix: &str) -> String {
    match source_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", source_name, suffix),
    }
}
