// shuttle/src/processors/resizer.rs
use crate::core::ResizeAlgorithm;
use crate::transform::{DestRect, SourceRect};
use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Resampling primitives the raster backend is built from.
#[derive(Debug, Clone, Copy)]
pub struct Resizer {
    algorithm: ResizeAlgorithm,
}

impl Resizer {
    pub fn new(algorithm: ResizeAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Resamples `source_rect` of `source` into `dest` on `canvas`. Negative
    /// source extents read the region mirrored along that axis. Pixels are
    /// replaced, not blended.
    pub fn copy_resampled(
        &self,
        canvas: &mut DynamicImage,
        source: &DynamicImage,
        dest: DestRect,
        source_rect: SourceRect,
    ) {
        let (sx, sw, mirror_x) = normalize_span(source_rect.x, source_rect.width);
        let (sy, sh, mirror_y) = normalize_span(source_rect.y, source_rect.height);

        let (x, w) = clamp_span(sx, sw, source.width());
        let (y, h) = clamp_span(sy, sh, source.height());

        let mut region = source.crop_imm(x, y, w, h);
        if mirror_x {
            region = region.fliph();
        }
        if mirror_y {
            region = region.flipv();
        }

        let resized = if region.width() == dest.width && region.height() == dest.height {
            region
        } else {
            log::debug!(
                "Resampling {}x{} region to {}x{}",
                region.width(),
                region.height(),
                dest.width,
                dest.height
            );
            region.resize_exact(dest.width, dest.height, self.filter_type())
        };

        imageops::replace(canvas, &resized, dest.x as i64, dest.y as i64);
    }

    /// Rotates counter-clockwise by `degrees`. The canvas grows to the rotated
    /// bounds and exposed corners are transparent black.
    pub fn rotate(&self, image: DynamicImage, degrees: f64) -> DynamicImage {
        let normalized = degrees.rem_euclid(360.0);
        if normalized == 0.0 {
            return image;
        }
        if normalized == 90.0 {
            return image.rotate270();
        }
        if normalized == 180.0 {
            return image.rotate180();
        }
        if normalized == 270.0 {
            return image.rotate90();
        }

        let bounds = crate::transform::rotated_bounds(
            crate::core::Dimensions::new(image.width(), image.height()),
            normalized,
        );
        let mut padded = RgbaImage::from_pixel(bounds.width, bounds.height, Rgba([0, 0, 0, 0]));
        let offset_x = (bounds.width.saturating_sub(image.width()) / 2) as i64;
        let offset_y = (bounds.height.saturating_sub(image.height()) / 2) as i64;
        imageops::replace(&mut padded, &image.to_rgba8(), offset_x, offset_y);

        // imageproc turns clockwise for positive angles.
        let theta = -(normalized.to_radians() as f32);
        DynamicImage::ImageRgba8(rotate_about_center(
            &padded,
            theta,
            self.interpolation(),
            Rgba([0, 0, 0, 0]),
        ))
    }

    fn filter_type(&self) -> FilterType {
        match self.algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bilinear => FilterType::Triangle,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
            ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
        }
    }

    fn interpolation(&self) -> Interpolation {
        match self.algorithm {
            ResizeAlgorithm::Nearest => Interpolation::Nearest,
            ResizeAlgorithm::Bilinear => Interpolation::Bilinear,
            ResizeAlgorithm::Bicubic | ResizeAlgorithm::Lanczos3 => Interpolation::Bicubic,
        }
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::new(ResizeAlgorithm::default())
    }
}

/// Turns a span with a possibly negative extent into (start, length, mirrored).
fn normalize_span(origin: f64, extent: f64) -> (f64, f64, bool) {
    if extent < 0.0 {
        (origin + extent, -extent, true)
    } else {
        (origin, extent, false)
    }
}

/// Rounds a span to whole pixels inside `0..limit`, never empty.
fn clamp_span(start: f64, length: f64, limit: u32) -> (u32, u32) {
    let first = (start.round().max(0.0) as u32).min(limit.saturating_sub(1));
    let length = (length.round().max(1.0) as u32).min(limit - first);
    (first, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, 0, 255])
        }))
    }

    fn full(width: u32, height: u32) -> DestRect {
        DestRect {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    #[test]
    fn mirrored_read_flips_horizontally() {
        let source = gradient(4, 2);
        let mut canvas = DynamicImage::new_rgba8(4, 2);
        let resizer = Resizer::new(ResizeAlgorithm::Nearest);

        resizer.copy_resampled(&mut canvas, &source, full(4, 2), SourceRect::new(4.0, 0.0, -4.0, 2.0));

        assert_eq!(canvas.get_pixel(0, 0), Rgba([3, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(3, 1), Rgba([0, 1, 0, 255]));
    }

    #[test]
    fn mirrored_read_flips_vertically() {
        let source = gradient(2, 3);
        let mut canvas = DynamicImage::new_rgba8(2, 3);
        let resizer = Resizer::new(ResizeAlgorithm::Nearest);

        resizer.copy_resampled(&mut canvas, &source, full(2, 3), SourceRect::new(0.0, 3.0, 2.0, -3.0));

        assert_eq!(canvas.get_pixel(1, 0), Rgba([1, 2, 0, 255]));
        assert_eq!(canvas.get_pixel(0, 2), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn copy_lands_at_offset() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));
        let mut canvas = DynamicImage::new_rgba8(6, 2);
        let dest = DestRect {
            x: 2,
            y: 0,
            width: 2,
            height: 2,
        };

        Resizer::default().copy_resampled(&mut canvas, &source, dest, SourceRect::new(0.0, 0.0, 2.0, 2.0));

        assert_eq!(canvas.get_pixel(1, 0)[3], 0);
        assert_eq!(canvas.get_pixel(2, 0), Rgba([9, 9, 9, 255]));
        assert_eq!(canvas.get_pixel(4, 1)[3], 0);
    }

    #[test]
    fn oversized_source_rect_is_clamped() {
        let source = gradient(10, 10);
        let mut canvas = DynamicImage::new_rgba8(5, 5);

        Resizer::default().copy_resampled(&mut canvas, &source, full(5, 5), SourceRect::new(-3.0, 4.0, 40.0, 40.0));
        assert_eq!(canvas.dimensions(), (5, 5));
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let resizer = Resizer::default();
        let image = gradient(4, 2);

        assert_eq!(resizer.rotate(image.clone(), 90.0).dimensions(), (2, 4));
        assert_eq!(resizer.rotate(image.clone(), -90.0).dimensions(), (2, 4));
        assert_eq!(resizer.rotate(image.clone(), 180.0).dimensions(), (4, 2));
        assert_eq!(resizer.rotate(image, 360.0).dimensions(), (4, 2));
    }

    #[test]
    fn positive_degrees_turn_counter_clockwise() {
        let resizer = Resizer::new(ResizeAlgorithm::Nearest);
        // Top-right pixel ends up top-left after a quarter turn to the left.
        let rotated = resizer.rotate(gradient(4, 2), 90.0);
        assert_eq!(rotated.get_pixel(0, 0), Rgba([3, 0, 0, 255]));
    }

    #[test]
    fn arbitrary_angle_expands_canvas() {
        let rotated = Resizer::default().rotate(gradient(100, 100), 45.0);
        assert_eq!(rotated.dimensions(), (141, 141));
    }
}
