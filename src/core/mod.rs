// shuttle/src/core/mod.rs
pub mod file;
pub mod mime;
pub mod pipeline;
pub mod upload;

use image::ImageFormat;
use std::fmt;
use thiserror::Error;

pub use file::{ExifData, FileHandle, FileInfo, Origin};
pub use pipeline::{Pipeline, PipelineResult, PipelineState};
pub use upload::{UploadError, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos3,
}

impl std::str::FromStr for ResizeAlgorithm {
    type Err = ShuttleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "bicubic" => Ok(Self::Bicubic),
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            other => Err(ShuttleError::Config(format!(
                "Invalid resize algorithm {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoder quality, clamped to 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// The only formats the transform phase decodes and encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Gif,
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/gif" => Some(Self::Gif),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Gif => ImageFormat::Gif,
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }

    /// GIF and PNG canvases keep an alpha channel.
    pub fn has_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

#[derive(Error, Debug)]
pub enum ShuttleError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Transformation failed: {0}")]
    Transformation(String),

    #[error("Transportation failed: {0}")]
    Transportation(String),

    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

impl ShuttleError {
    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Io(m)
            | Self::Validation(m)
            | Self::Config(m)
            | Self::UnsupportedFormat(m)
            | Self::Transformation(m)
            | Self::Transportation(m)
            | Self::RuntimeUnavailable(m) => m,
        }
    }
}

impl From<std::io::Error> for ShuttleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for ShuttleError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ShuttleError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transportation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShuttleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_clamped() {
        assert_eq!(Quality::new(250).value(), 100);
        assert_eq!(Quality::new(40).value(), 40);
        assert_eq!(Quality::default().value(), 100);
    }

    #[test]
    fn raster_format_accepts_pjpeg_alias() {
        assert_eq!(RasterFormat::from_mime("image/pjpeg"), Some(RasterFormat::Jpeg));
        assert_eq!(RasterFormat::from_mime("image/webp"), None);
        assert!(RasterFormat::Png.has_alpha());
        assert!(!RasterFormat::Jpeg.has_alpha());
    }

    #[test]
    fn error_message_strips_kind() {
        let err = ShuttleError::Validation("Invalid extension".into());
        assert_eq!(err.message(), "Invalid extension");
        assert_eq!(err.to_string(), "Validation failed: Invalid extension");
    }
}
