// shuttle/src/processors/backend.rs
use super::{Compressor, Loader, Resizer};
use crate::core::{Quality, RasterFormat, ResizeAlgorithm, Result};
use crate::transform::{check_dimensions, output_dimensions, GeometryPlan};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

/// One execution of a geometry plan: read `source`, write `output`.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub format: RasterFormat,
    pub plan: GeometryPlan,
    pub quality: Quality,
}

/// Performs the pixel work for the transform engine.
pub trait RasterBackend {
    fn render(&self, request: &RenderRequest) -> Result<()>;
}

/// Pure Rust backend on top of `image` and `imageproc`.
#[derive(Debug, Clone, Default)]
pub struct ImageBackend {
    loader: Loader,
    resizer: Resizer,
    optimize_png: bool,
}

impl ImageBackend {
    pub fn new(algorithm: ResizeAlgorithm) -> Self {
        Self {
            loader: Loader::new(),
            resizer: Resizer::new(algorithm),
            optimize_png: false,
        }
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    pub fn decode(&self, path: &Path, format: RasterFormat) -> Result<DynamicImage> {
        self.loader.load(path, format)
    }

    /// Blank canvas. GIF and PNG start fully transparent, JPEG starts black,
    /// and a fill color paints the whole canvas opaque.
    pub fn new_canvas(
        &self,
        width: u32,
        height: u32,
        format: RasterFormat,
        fill: Option<[u8; 3]>,
    ) -> DynamicImage {
        match (fill, format.has_alpha()) {
            (Some([r, g, b]), true) => {
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])))
            }
            (Some(rgb), false) => DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))),
            (None, true) => DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                width,
                height,
                Rgba([255, 255, 255, 0]),
            )),
            (None, false) => DynamicImage::new_rgb8(width, height),
        }
    }

    pub fn encode(
        &self,
        canvas: &DynamicImage,
        path: &Path,
        format: RasterFormat,
        quality: Quality,
    ) -> Result<()> {
        Compressor::new(quality)
            .with_png_optimization(self.optimize_png)
            .save(canvas, path, format)
    }
}

impl RasterBackend for ImageBackend {
    fn render(&self, request: &RenderRequest) -> Result<()> {
        let plan = &request.plan;
        check_dimensions(plan.canvas)?;
        check_dimensions(output_dimensions(plan))?;
        let source = self.decode(&request.source, request.format)?;

        let mut canvas = self.new_canvas(
            plan.canvas.width,
            plan.canvas.height,
            request.format,
            plan.fill,
        );
        self.resizer
            .copy_resampled(&mut canvas, &source, plan.dest, plan.source);

        if let Some(degrees) = plan.rotation {
            canvas = self.resizer.rotate(canvas, degrees);
        }

        self.encode(&canvas, &request.output, request.format, request.quality)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::ShuttleError;
    use crate::transform::{plan_fit, plan_rotate, FitConfig, RotateConfig};
    use crate::core::Dimensions;
    use image::GenericImageView;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records render requests and copies the source through unchanged.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub requests: Mutex<Vec<RenderRequest>>,
    }

    impl RasterBackend for RecordingBackend {
        fn render(&self, request: &RenderRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            if request.source != request.output {
                std::fs::copy(&request.source, &request.output)?;
            }
            Ok(())
        }
    }

    /// Delegates to [`ImageBackend`] and fails once `succeed` renders are done.
    pub struct FailingBackend {
        pub succeed: usize,
        pub calls: AtomicUsize,
        pub inner: ImageBackend,
    }

    impl FailingBackend {
        pub fn after(succeed: usize) -> Self {
            Self {
                succeed,
                calls: AtomicUsize::new(0),
                inner: ImageBackend::default(),
            }
        }
    }

    impl RasterBackend for FailingBackend {
        fn render(&self, request: &RenderRequest) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.succeed {
                return Err(ShuttleError::Io("disk full".to_string()));
            }
            self.inner.render(request)
        }
    }

    #[test]
    fn fit_letterboxes_with_fill() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tall.png");
        let output = dir.path().join("boxed.png");
        image::RgbaImage::from_pixel(10, 20, Rgba([0, 0, 255, 255]))
            .save(&source)
            .unwrap();

        let plan = plan_fit(
            Dimensions::new(10, 20),
            &FitConfig::new(20, 20).with_fill([255, 0, 0]),
        )
        .unwrap();
        ImageBackend::default()
            .render(&RenderRequest {
                source,
                output: output.clone(),
                format: RasterFormat::Png,
                plan,
                quality: Quality::default(),
            })
            .unwrap();

        let result = image::open(&output).unwrap();
        assert_eq!(result.dimensions(), (20, 20));
        assert_eq!(result.get_pixel(0, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(result.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert_eq!(result.get_pixel(19, 10), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rotation_changes_output_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.jpg");
        image::RgbImage::new(30, 10).save(&source).unwrap();

        let plan = plan_rotate(Dimensions::new(30, 10), &RotateConfig::new(90.0)).unwrap();
        let output = dir.path().join("turned.jpg");
        ImageBackend::default()
            .render(&RenderRequest {
                source,
                output: output.clone(),
                format: RasterFormat::Jpeg,
                plan,
                quality: Quality::new(90),
            })
            .unwrap();

        assert_eq!(image::image_dimensions(&output).unwrap(), (10, 30));
    }

    #[test]
    fn oversized_canvas_fails_before_allocating() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("small.jpg");
        image::RgbImage::new(30, 10).save(&source).unwrap();

        let mut plan = plan_rotate(Dimensions::new(30, 10), &RotateConfig::new(0.0)).unwrap();
        plan.canvas = Dimensions::new(200_000, 10);
        let output = dir.path().join("huge.jpg");
        let err = ImageBackend::default()
            .render(&RenderRequest {
                source,
                output: output.clone(),
                format: RasterFormat::Jpeg,
                plan,
                quality: Quality::default(),
            })
            .unwrap_err();

        assert!(matches!(err, ShuttleError::Config(_)));
        assert!(!output.exists());
    }

    #[test]
    fn transparent_canvas_for_alpha_formats() {
        let backend = ImageBackend::default();
        let png = backend.new_canvas(2, 2, RasterFormat::Png, None);
        assert_eq!(png.get_pixel(0, 0)[3], 0);
        let jpeg = backend.new_canvas(2, 2, RasterFormat::Jpeg, None);
        assert_eq!(jpeg.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }
}
