// shuttle/src/processors/compressor.rs
use crate::core::{Quality, RasterFormat, Result, ShuttleError};
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Frame, ImageFormat};
use oxipng::{optimize_from_memory, Options};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

/// Encodes canvases back into the format they were read from. Re-encoding
/// drops any exif block.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    quality: Quality,
    optimize_png: bool,
}

impl Compressor {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            optimize_png: false,
        }
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    pub fn save(&self, image: &DynamicImage, path: &Path, format: RasterFormat) -> Result<()> {
        log::debug!(
            "Saving image to {} with format {:?}, quality: {}",
            path.display(),
            format,
            self.quality.value()
        );

        let bytes = self.encode(image, format)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        log::info!("Saved image: {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn encode(&self, image: &DynamicImage, format: RasterFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        match format {
            RasterFormat::Jpeg => {
                // The JPEG encoder has no alpha channel and rejects quality 0.
                let quality = self.quality.value().max(1);
                let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                encoder.encode_image(&image.to_rgb8())?;
            }
            RasterFormat::Png => {
                let mut cursor = Cursor::new(&mut buffer);
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut cursor, ImageFormat::Png)?;
                if self.optimize_png {
                    return self.optimize_png_bytes(&buffer);
                }
            }
            RasterFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut buffer);
                encoder.encode_frame(Frame::new(image.to_rgba8()))?;
            }
        }

        Ok(buffer)
    }

    fn optimize_png_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        optimize_from_memory(data, &Options::default())
            .map_err(|e| ShuttleError::Io(format!("PNG optimization failed: {}", e)))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(Quality::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 8, Rgba([10, 200, 30, 128])))
    }

    #[test]
    fn encodes_each_supported_format() {
        let compressor = Compressor::new(Quality::new(80));
        for (format, image_format) in [
            (RasterFormat::Jpeg, ImageFormat::Jpeg),
            (RasterFormat::Png, ImageFormat::Png),
            (RasterFormat::Gif, ImageFormat::Gif),
        ] {
            let bytes = compressor.encode(&sample(), format).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), image_format);
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (12, 8));
        }
    }

    #[test]
    fn png_keeps_alpha() {
        let bytes = Compressor::default().encode(&sample(), RasterFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn optimized_png_still_decodes() {
        let compressor = Compressor::default().with_png_optimization(true);
        let bytes = compressor.encode(&sample(), RasterFormat::Png).unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (12, 8));
    }

    #[test]
    fn lower_quality_gives_smaller_jpeg() {
        let noisy = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 7 % 255) as u8, (y * 13 % 255) as u8, ((x * y) % 255) as u8, 255])
        }));
        let high = Compressor::new(Quality::new(100)).encode(&noisy, RasterFormat::Jpeg).unwrap();
        let low = Compressor::new(Quality::new(10)).encode(&noisy, RasterFormat::Jpeg).unwrap();
        assert!(low.len() < high.len());
    }
}
