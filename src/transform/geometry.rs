// shuttle/src/transform/geometry.rs
//! Pure geometry for every transform kind.
//!
//! Each planner maps the current image size and its options to a
//! [`GeometryPlan`]. Sizes stay fractional until the destination is assigned,
//! where they are rounded half away from zero.

use super::params::{
    CropAnchor, CropConfig, CropLocation, FitConfig, FlipConfig, FlipDirection,
    HorizontalAlign, ResizeConfig, ResizeMode, RotateConfig, ScaleConfig, SourceRect,
    Transform, VerticalAlign,
};
use crate::core::{Dimensions, Result, ShuttleError};

/// Longest side any planned canvas may have.
pub const MAX_DIMENSION: u32 = 100_000;
/// Largest pixel count any planned canvas may have (16384 x 16384).
pub const MAX_PIXELS: u64 = 1 << 28;

/// Placement of the resampled source on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything the raster backend needs to perform one resample-copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryPlan {
    pub canvas: Dimensions,
    pub dest: DestRect,
    pub source: SourceRect,
    pub fill: Option<[u8; 3]>,
    /// Counter-clockwise rotation applied after the copy.
    pub rotation: Option<f64>,
}

impl GeometryPlan {
    /// Copies the whole source onto a canvas of `width` x `height`.
    fn stretched(base: Dimensions, width: u32, height: u32) -> Self {
        Self {
            canvas: Dimensions::new(width, height),
            dest: DestRect {
                x: 0,
                y: 0,
                width,
                height,
            },
            source: full_source(base),
            fill: None,
            rotation: None,
        }
    }

    fn rotated(mut self, degrees: f64) -> Self {
        self.rotation = Some(degrees);
        self
    }
}

fn full_source(base: Dimensions) -> SourceRect {
    SourceRect::new(0.0, 0.0, base.width as f64, base.height as f64)
}

fn to_pixels(value: f64) -> u32 {
    value.round().clamp(1.0, u32::MAX as f64) as u32
}

/// Fails when a canvas of `size` is too large to allocate.
pub fn check_dimensions(size: Dimensions) -> Result<()> {
    let pixels = size.width as u64 * size.height as u64;
    if size.width > MAX_DIMENSION || size.height > MAX_DIMENSION || pixels > MAX_PIXELS {
        return Err(ShuttleError::Config(format!(
            "Destination size {} exceeds the canvas limit",
            size
        )));
    }
    Ok(())
}

/// Rejects plans whose canvas, before or after rotation, is too large.
fn checked(plan: GeometryPlan) -> Result<GeometryPlan> {
    check_dimensions(plan.canvas)?;
    check_dimensions(output_dimensions(&plan))?;
    Ok(plan)
}

/// Plans `transform` for an image of size `base`. Orientation is planned
/// separately because it depends on exif data, see [`plan_orientation`].
pub fn plan(base: Dimensions, transform: &Transform) -> Result<GeometryPlan> {
    if base.width == 0 || base.height == 0 {
        return Err(ShuttleError::UnsupportedFormat(format!(
            "Cannot transform an image of {}",
            base
        )));
    }

    match transform {
        Transform::Crop(config) => plan_crop(base, config),
        Transform::Fit(config) => plan_fit(base, config),
        Transform::Resize(config) => plan_resize(base, config),
        Transform::Scale(config) => plan_scale(base, config),
        Transform::Flip(config) => Ok(plan_flip(base, config)),
        Transform::Rotate(config) => plan_rotate(base, config),
        Transform::Orientation => Err(ShuttleError::Config(
            "Orientation is planned from exif data".to_string(),
        )),
    }
}

/// Fills in a missing target dimension from the source aspect ratio. The
/// derived side is rounded here since it becomes a literal target.
fn resolve_target(
    base: Dimensions,
    width: Option<u32>,
    height: Option<u32>,
    kind: &str,
) -> Result<(f64, f64)> {
    let (bw, bh) = (base.width as f64, base.height as f64);
    match (width.filter(|w| *w > 0), height.filter(|h| *h > 0)) {
        (Some(w), Some(h)) => Ok((w as f64, h as f64)),
        (Some(w), None) => Ok((w as f64, (bh * w as f64 / bw).round())),
        (None, Some(h)) => Ok(((bw * h as f64 / bh).round(), h as f64)),
        (None, None) => Err(ShuttleError::Config(format!(
            "Invalid width and height for {}",
            kind
        ))),
    }
}

pub fn plan_resize(base: Dimensions, config: &ResizeConfig) -> Result<GeometryPlan> {
    let (bw, bh) = (base.width as f64, base.height as f64);
    let (width, height) = resolve_target(base, config.width, config.height, "resize")?;

    let (mut new_w, mut new_h) = if config.aspect {
        let width_scale = width / bw;
        let height_scale = height / bh;
        let (keep_width, keep_height) = match config.mode {
            ResizeMode::Width => (width_scale < height_scale, width_scale > height_scale),
            ResizeMode::Height => (width_scale > height_scale, width_scale < height_scale),
        };

        if keep_width {
            (width, bh * width / bw)
        } else if keep_height {
            (bw * height / bh, height)
        } else {
            (width, height)
        }
    } else {
        (width, height)
    };

    if !config.expand {
        new_w = new_w.min(bw);
        new_h = new_h.min(bh);
    }

    checked(GeometryPlan::stretched(base, to_pixels(new_w), to_pixels(new_h)))
}

pub fn plan_crop(base: Dimensions, config: &CropConfig) -> Result<GeometryPlan> {
    let (bw, bh) = (base.width as f64, base.height as f64);
    let (width, height) = resolve_target(base, config.width, config.height, "crop")?;

    let source = match config.location {
        CropLocation::Rect(rect) => rect,
        CropLocation::Anchor(anchor) => {
            let width_scale = bw / width;
            let height_scale = bh / height;

            if width_scale > height_scale {
                let src_w = width * height_scale;
                let x = match anchor {
                    CropAnchor::Center => (bw - src_w) / 2.0,
                    CropAnchor::Right | CropAnchor::Bottom => bw - src_w,
                    CropAnchor::Left | CropAnchor::Top => 0.0,
                };
                SourceRect::new(x, 0.0, src_w, bh)
            } else {
                let src_h = height * width_scale;
                let y = match anchor {
                    CropAnchor::Center => (bh - src_h) / 2.0,
                    CropAnchor::Right | CropAnchor::Bottom => bh - src_h,
                    CropAnchor::Left | CropAnchor::Top => 0.0,
                };
                SourceRect::new(0.0, y, bw, src_h)
            }
        }
    };

    let mut plan = GeometryPlan::stretched(base, to_pixels(width), to_pixels(height));
    plan.source = source;
    checked(plan)
}

pub fn plan_fit(base: Dimensions, config: &FitConfig) -> Result<GeometryPlan> {
    let (Some(width), Some(height)) = (
        config.width.filter(|w| *w > 0),
        config.height.filter(|h| *h > 0),
    ) else {
        return Err(ShuttleError::Config(
            "Invalid width and height for fit".to_string(),
        ));
    };

    let (bw, bh) = (base.width as f64, base.height as f64);
    let aspect = (bw / width as f64).max(bh / height as f64);
    let fit_w = to_pixels(bw / aspect);
    let fit_h = to_pixels(bh / aspect);

    let Some(fill) = config.fill else {
        return checked(GeometryPlan::stretched(base, fit_w, fit_h));
    };
    if fit_w == width && fit_h == height {
        return checked(GeometryPlan::stretched(base, fit_w, fit_h));
    }

    let (mut x, mut y) = (0, 0);
    if fit_w < width {
        let gap = width - fit_w;
        x = match config.horizontal {
            HorizontalAlign::Center => gap / 2,
            HorizontalAlign::Right => gap,
            HorizontalAlign::Left => 0,
        };
    } else if fit_h < height {
        let gap = height - fit_h;
        y = match config.vertical {
            VerticalAlign::Center => gap / 2,
            VerticalAlign::Bottom => gap,
            VerticalAlign::Top => 0,
        };
    }

    checked(GeometryPlan {
        canvas: Dimensions::new(width, height),
        dest: DestRect {
            x,
            y,
            width: fit_w,
            height: fit_h,
        },
        source: full_source(base),
        fill: Some(fill),
        rotation: None,
    })
}

pub fn plan_scale(base: Dimensions, config: &ScaleConfig) -> Result<GeometryPlan> {
    let percent = config
        .percent
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| ShuttleError::Config("Invalid percent for scale".to_string()))?;

    checked(GeometryPlan::stretched(
        base,
        to_pixels(base.width as f64 * percent),
        to_pixels(base.height as f64 * percent),
    ))
}

/// Mirrors by reading the source with negative extents from its far edge.
pub fn plan_flip(base: Dimensions, config: &FlipConfig) -> GeometryPlan {
    let (bw, bh) = (base.width as f64, base.height as f64);
    let mut plan = GeometryPlan::stretched(base, base.width, base.height);
    plan.source = match config.direction {
        FlipDirection::Vertical => SourceRect::new(0.0, bh, bw, -bh),
        FlipDirection::Horizontal => SourceRect::new(bw, 0.0, -bw, bh),
        FlipDirection::Both => SourceRect::new(bw, bh, -bw, -bh),
    };
    plan
}

/// The copy keeps the original canvas; the backend grows it to the rotated
/// bounds when it applies the rotation.
pub fn plan_rotate(base: Dimensions, config: &RotateConfig) -> Result<GeometryPlan> {
    if !config.degrees.is_finite() {
        return Err(ShuttleError::Config(
            "Invalid degrees for rotate".to_string(),
        ));
    }
    checked(GeometryPlan::stretched(base, base.width, base.height).rotated(config.degrees))
}

/// Maps an exif orientation to the plan that puts the image upright. `None`
/// for 1, unknown values, and missing tags.
pub fn plan_orientation(base: Dimensions, orientation: u16) -> Option<GeometryPlan> {
    let flip = |direction| plan_flip(base, &FlipConfig::new(direction));
    let turn = |degrees| GeometryPlan::stretched(base, base.width, base.height).rotated(degrees);

    match orientation {
        2 => Some(flip(FlipDirection::Horizontal)),
        3 => Some(turn(180.0)),
        4 => Some(flip(FlipDirection::Vertical)),
        5 => Some(flip(FlipDirection::Vertical).rotated(-90.0)),
        6 => Some(turn(-90.0)),
        7 => Some(flip(FlipDirection::Vertical).rotated(90.0)),
        8 => Some(turn(90.0)),
        _ => None,
    }
}

/// Size of the canvas once `plan` has been executed, rotation included.
pub fn output_dimensions(plan: &GeometryPlan) -> Dimensions {
    match plan.rotation {
        Some(degrees) => rotated_bounds(plan.canvas, degrees),
        None => plan.canvas,
    }
}

/// Bounding box of a `size` canvas rotated by `degrees`.
pub fn rotated_bounds(size: Dimensions, degrees: f64) -> Dimensions {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 || normalized == 180.0 {
        return size;
    }
    if normalized == 90.0 || normalized == 270.0 {
        return Dimensions::new(size.height, size.width);
    }

    let radians = normalized.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let (w, h) = (size.width as f64, size.height as f64);
    Dimensions::new(to_pixels(w * cos + h * sin), to_pixels(w * sin + h * cos))
}
