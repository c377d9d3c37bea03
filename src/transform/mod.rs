// shuttle/src/transform/mod.rs
mod geometry;
mod params;

pub use geometry::{
    check_dimensions, output_dimensions, plan, plan_crop, plan_fit, plan_flip, plan_orientation,
    plan_resize, plan_rotate, plan_scale, rotated_bounds, DestRect, GeometryPlan, MAX_DIMENSION,
    MAX_PIXELS,
};
pub use params::{
    CropAnchor, CropConfig, CropLocation, FitConfig, FlipConfig, FlipDirection, HorizontalAlign,
    ResizeConfig, ResizeMode, RotateConfig, ScaleConfig, SourceRect, Transform, TransformSpec,
    VerticalAlign,
};

use crate::core::{FileHandle, RasterFormat, Result, ShuttleError};
use crate::processors::{ImageBackend, RasterBackend, RenderRequest};
use crate::utils::unique_suffix;
use std::path::PathBuf;

/// Applies transform specs to files through a raster backend.
pub struct TransformEngine {
    backend: Box<dyn RasterBackend>,
}

impl TransformEngine {
    pub fn new(backend: Box<dyn RasterBackend>) -> Self {
        Self { backend }
    }

    /// Runs `spec` against `file` and returns a handle to the result.
    ///
    /// With `overwrite` the result replaces `file` on disk; otherwise it is
    /// written next to it as `<name>-<kind>-<WxH>-<suffix>.<ext>` or under the
    /// spec's explicit target name. Orientation is only accepted with
    /// `overwrite`, and returns the input untouched when there is nothing to
    /// correct.
    pub fn apply(&self, file: &FileHandle, spec: &TransformSpec, overwrite: bool) -> Result<FileHandle> {
        if matches!(spec.transform, Transform::Orientation) && !overwrite {
            return Err(ShuttleError::Config(
                "Orientation can only be applied to the original".to_string(),
            ));
        }
        let mime_type = file.mime_type()?;
        let format = RasterFormat::from_mime(&mime_type).ok_or_else(|| {
            if mime_type.starts_with("image/") {
                ShuttleError::UnsupportedFormat(format!("{} can not be transformed", file.basename()))
            } else {
                ShuttleError::UnsupportedFormat(format!("{} is not a valid image", file.basename()))
            }
        })?;
        let base = file.dimensions()?.ok_or_else(|| {
            ShuttleError::UnsupportedFormat(format!("{} is not a valid image", file.basename()))
        })?;

        let (plan, overwrite) = match spec.transform {
            Transform::Orientation => {
                let orientation = file.exif()?.orientation_value().unwrap_or(1);
                match plan_orientation(base, orientation) {
                    Some(plan) => (plan, overwrite),
                    None => {
                        log::debug!("{} is already upright", file.basename());
                        return FileHandle::open(file.path());
                    }
                }
            }
            ref transform => (plan(base, transform)?, overwrite),
        };

        let output = self.output_path(file, spec, &plan, overwrite);
        log::debug!(
            "Applying {} to {} ({} -> {})",
            spec.transform.kind(),
            file.basename(),
            base,
            output_dimensions(&plan)
        );

        self.backend.render(&RenderRequest {
            source: file.path().to_path_buf(),
            output: output.clone(),
            format,
            plan,
            quality: spec.quality,
        })?;

        FileHandle::open(output)
    }

    fn output_path(&self, file: &FileHandle, spec: &TransformSpec, plan: &GeometryPlan, overwrite: bool) -> PathBuf {
        if overwrite {
            return file.path().to_path_buf();
        }

        let name = match &spec.target {
            Some(target) => target.clone(),
            None => format!(
                "{}-{}-{}-{}",
                file.name(),
                spec.transform.kind(),
                output_dimensions(plan),
                unique_suffix()
            ),
        };
        file.dir().join(format!("{}.{}", name, file.ext()))
    }
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new(Box::new(ImageBackend::default()))
    }
}
