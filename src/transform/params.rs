// shuttle/src/transform/params.rs
//! Per-kind transform options, each with explicit defaults.

use crate::core::{Quality, Result, ShuttleError};
use std::fmt;
use std::str::FromStr;

/// A rectangle of the source image. Negative extents read the source mirrored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

macro_rules! named_options {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl FromStr for $name {
            type Err = ShuttleError;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ShuttleError::Config(format!(
                        concat!("Invalid ", $what, " {}"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $(Self::$variant => $text,)+
                };
                f.write_str(text)
            }
        }
    };
}

/// Which target dimension wins when a resize has to keep the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    #[default]
    Width,
    Height,
}

named_options!(ResizeMode, "resize mode", { Width => "width", Height => "height" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropAnchor {
    Top,
    Bottom,
    Left,
    Right,
    #[default]
    Center,
}

named_options!(CropAnchor, "crop location", {
    Top => "top",
    Bottom => "bottom",
    Left => "left",
    Right => "right",
    Center => "center",
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropLocation {
    Anchor(CropAnchor),
    Rect(SourceRect),
}

impl Default for CropLocation {
    fn default() -> Self {
        Self::Anchor(CropAnchor::Center)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalAlign {
    Left,
    #[default]
    Center,
    Right,
}

named_options!(HorizontalAlign, "horizontal alignment", {
    Left => "left",
    Center => "center",
    Right => "right",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

named_options!(VerticalAlign, "vertical alignment", {
    Top => "top",
    Center => "center",
    Bottom => "bottom",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipDirection {
    #[default]
    Vertical,
    Horizontal,
    Both,
}

named_options!(FlipDirection, "flip direction", {
    Vertical => "vertical",
    Horizontal => "horizontal",
    Both => "both",
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: ResizeMode,
    pub expand: bool,
    pub aspect: bool,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            mode: ResizeMode::Width,
            expand: false,
            aspect: true,
        }
    }
}

impl ResizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_mode(mut self, mode: ResizeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_aspect(mut self, aspect: bool) -> Self {
        self.aspect = aspect;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CropConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub location: CropLocation,
}

impl CropConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_anchor(mut self, anchor: CropAnchor) -> Self {
        self.location = CropLocation::Anchor(anchor);
        self
    }

    pub fn with_source_rect(mut self, rect: SourceRect) -> Self {
        self.location = CropLocation::Rect(rect);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FitConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fill: Option<[u8; 3]>,
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
}

impl FitConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn with_fill(mut self, rgb: [u8; 3]) -> Self {
        self.fill = Some(rgb);
        self
    }

    pub fn with_alignment(mut self, horizontal: HorizontalAlign, vertical: VerticalAlign) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfig {
    pub percent: Option<f64>,
}

impl ScaleConfig {
    pub fn new(percent: f64) -> Self {
        Self {
            percent: Some(percent),
        }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { percent: Some(0.5) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlipConfig {
    pub direction: FlipDirection,
}

impl FlipConfig {
    pub fn new(direction: FlipDirection) -> Self {
        Self { direction }
    }
}

/// Degrees counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotateConfig {
    pub degrees: f64,
}

impl RotateConfig {
    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }
}

impl Default for RotateConfig {
    fn default() -> Self {
        Self { degrees: 180.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Crop(CropConfig),
    Fit(FitConfig),
    Resize(ResizeConfig),
    Scale(ScaleConfig),
    Flip(FlipConfig),
    Rotate(RotateConfig),
    /// Undo the camera orientation recorded in exif.
    Orientation,
}

impl Transform {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crop(_) => "crop",
            Self::Fit(_) => "fit",
            Self::Resize(_) => "resize",
            Self::Scale(_) => "scale",
            Self::Flip(_) => "flip",
            Self::Rotate(_) => "rotate",
            Self::Orientation => "orientation",
        }
    }

    /// Rejects options that can never produce a destination size.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: Option<u32>| v.filter(|v| *v > 0).is_some();
        match self {
            Self::Crop(c) if !positive(c.width) && !positive(c.height) => Err(
                ShuttleError::Config("Invalid width and height for crop".to_string()),
            ),
            Self::Resize(c) if !positive(c.width) && !positive(c.height) => Err(
                ShuttleError::Config("Invalid width and height for resize".to_string()),
            ),
            Self::Fit(c) if !positive(c.width) || !positive(c.height) => Err(
                ShuttleError::Config("Invalid width and height for fit".to_string()),
            ),
            Self::Scale(c) if !c.percent.is_some_and(|p| p.is_finite() && p > 0.0) => Err(
                ShuttleError::Config("Invalid percent for scale".to_string()),
            ),
            Self::Rotate(c) if !c.degrees.is_finite() => Err(ShuttleError::Config(
                "Invalid degrees for rotate".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Like [`Transform::validate`], and also rejects kinds that can only
    /// rewrite the original in place.
    pub fn validate_branch(&self) -> Result<()> {
        if matches!(self, Self::Orientation) {
            return Err(ShuttleError::Config(
                "Orientation can only be applied to the original".to_string(),
            ));
        }
        self.validate()
    }
}

/// A transform together with its output settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub transform: Transform,
    pub quality: Quality,
    /// Explicit output name, without extension.
    pub target: Option<String>,
}

impl TransformSpec {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            quality: Quality::default(),
            target: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Quality::new(quality);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl From<Transform> for TransformSpec {
    fn from(transform: Transform) -> Self {
        Self::new(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_direction_is_config_error() {
        let err = "sideways".parse::<FlipDirection>().unwrap_err();
        assert!(matches!(err, ShuttleError::Config(_)));
        assert_eq!(err.message(), "Invalid flip direction sideways");
        assert_eq!("BOTH".parse::<FlipDirection>().unwrap(), FlipDirection::Both);
    }

    #[test]
    fn defaults() {
        assert!(ResizeConfig::new().aspect);
        assert!(!ResizeConfig::new().expand);
        assert_eq!(ResizeConfig::new().mode, ResizeMode::Width);
        assert_eq!(ScaleConfig::default().percent, Some(0.5));
        assert_eq!(RotateConfig::default().degrees, 180.0);
        assert_eq!(CropConfig::new().location, CropLocation::Anchor(CropAnchor::Center));
        assert_eq!(FlipConfig::default().direction, FlipDirection::Vertical);
    }

    #[test]
    fn validate_catches_missing_dimensions() {
        assert!(Transform::Crop(CropConfig::new()).validate().is_err());
        assert!(Transform::Crop(CropConfig::new().with_height(10)).validate().is_ok());
        assert!(Transform::Resize(ResizeConfig::new()).validate().is_err());
        assert!(Transform::Fit(FitConfig {
            width: Some(10),
            ..Default::default()
        })
        .validate()
        .is_err());
        assert!(Transform::Scale(ScaleConfig { percent: None }).validate().is_err());
        assert!(Transform::Scale(ScaleConfig::new(0.0)).validate().is_err());
        assert!(Transform::Orientation.validate().is_ok());
    }

    #[test]
    fn orientation_is_not_a_branch_transform() {
        let err = Transform::Orientation.validate_branch().unwrap_err();
        assert_eq!(err.message(), "Orientation can only be applied to the original");
        assert!(Transform::Scale(ScaleConfig::new(0.5)).validate_branch().is_ok());
        assert!(Transform::Crop(CropConfig::new()).validate_branch().is_err());
    }
}
