// shuttle/src/processors/loader.rs
use crate::core::{Dimensions, RasterFormat, Result, ShuttleError};
use crate::transform::MAX_DIMENSION;
use image::{DynamicImage, ImageReader};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((MAX_DIMENSION, MAX_DIMENSION)),
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    /// Decodes `path` as `format`, regardless of what the bytes look like.
    pub fn load(&self, path: &Path, format: RasterFormat) -> Result<DynamicImage> {
        log::debug!("Loading {:?} image from: {}", format, path.display());

        let mut reader = ImageReader::open(path)?;
        reader.set_format(format.image_format());
        let image = reader.decode().map_err(|e| {
            ShuttleError::Io(format!("Failed to decode {}: {}", path.display(), e))
        })?;

        if let Some((max_w, max_h)) = self.max_dimensions {
            if image.width() > max_w || image.height() > max_h {
                return Err(ShuttleError::UnsupportedFormat(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    image.width(),
                    image.height(),
                    max_w,
                    max_h
                )));
            }
        }

        Ok(image)
    }

    /// Reads the dimensions from the image header, decoding the whole file
    /// when the header cannot be parsed. `None` when neither works.
    pub fn probe_dimensions(&self, path: &Path) -> Option<Dimensions> {
        let header = ImageReader::open(path)
            .ok()
            .and_then(|reader| reader.with_guessed_format().ok())
            .and_then(|reader| reader.into_dimensions().ok());

        if let Some((width, height)) = header {
            return Some(Dimensions::new(width, height));
        }

        log::debug!(
            "Header probe failed for {}, falling back to a full decode",
            path.display()
        );
        image::open(path)
            .ok()
            .map(|image| Dimensions::new(image.width(), image.height()))
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
