//! Thumbnail re-encoding.
//!
//! Images are scaled down (never up) to fit inside `max_width × max_height`
//! with their aspect ratio preserved, flattened onto white when they carry
//! alpha, and encoded as baseline JPEG. If the result is above the byte
//! budget, quality is lowered in steps of 10 down to a floor of 40. The same
//! input bytes and settings always produce the same output.

use crate::config::ImageSettings;
use crate::error::PipelineError;
use crate::models::{ImageCandidate, ImageSource};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use tracing::{debug, instrument};

/// Encoded thumbnails above this size get recompressed at lower quality.
pub const MAX_OUTPUT_BYTES: usize = 200 * 1024;

const MIN_QUALITY: u8 = 40;

/// An encoded JPEG thumbnail ready for upload.
#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub source: ImageSource,
    /// URL the original was fetched from.
    pub origin_url: String,
}

/// Resizes and recompresses raw images.
#[derive(Debug, Clone)]
pub struct ImageOptimizer {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
    pub max_output_bytes: usize,
}

impl ImageOptimizer {
    pub fn new(settings: &ImageSettings) -> Self {
        Self {
            max_width: settings.max_width,
            max_height: settings.max_height,
            quality: settings.quality.clamp(1, 100),
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }

    /// Decode, bound, flatten and encode a fetched image.
    #[instrument(level = "debug", skip_all, fields(url = %candidate.url))]
    pub fn optimize(&self, candidate: &ImageCandidate) -> Result<OptimizedImage, PipelineError> {
        let decoded = image::load_from_memory(&candidate.raw_bytes)
            .map_err(|e| PipelineError::ImageUnresolvable(format!("{}: {e}", candidate.url)))?;
        let original = (decoded.width(), decoded.height());
        let rgb = flatten(&self.fit(decoded));

        let mut quality = self.quality;
        let mut bytes = encode_jpeg(&rgb, quality)?;
        while bytes.len() > self.max_output_bytes && quality > MIN_QUALITY {
            quality = quality.saturating_sub(10).max(MIN_QUALITY);
            bytes = encode_jpeg(&rgb, quality)?;
        }

        debug!(
            ?original,
            resized = ?(rgb.width(), rgb.height()),
            quality,
            bytes = bytes.len(),
            "Optimized image"
        );
        Ok(OptimizedImage {
            bytes,
            width: rgb.width(),
            height: rgb.height(),
            quality,
            source: candidate.source,
            origin_url: candidate.url.clone(),
        })
    }

    /// Scale down to fit the bounds; images already inside are left alone.
    fn fit(&self, image: DynamicImage) -> DynamicImage {
        if image.width() <= self.max_width && image.height() <= self.max_height {
            image
        } else {
            image.resize(self.max_width, self.max_height, FilterType::Lanczos3)
        }
    }
}

/// Composite onto an opaque white background, dropping alpha.
fn flatten(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let alpha = p[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::ImageUnresolvable(format!("encode: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn candidate(image: DynamicImage) -> ImageCandidate {
        let mut raw_bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut raw_bytes), ImageFormat::Png)
            .unwrap();
        ImageCandidate {
            source: ImageSource::OgMeta,
            url: "https://img.example.com/a.png".to_string(),
            width: image.width(),
            height: image.height(),
            raw_bytes,
        }
    }

    fn optimizer() -> ImageOptimizer {
        ImageOptimizer::new(&ImageSettings::default())
    }

    #[test]
    fn test_downscales_to_bounds() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(800, 600));
        let out = optimizer().optimize(&candidate(input)).unwrap();
        assert_eq!((out.width, out.height), (400, 300));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn test_preserves_aspect_ratio() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(1000, 200));
        let out = optimizer().optimize(&candidate(input)).unwrap();
        assert_eq!(out.width, 400);
        assert_eq!(out.height, 80);

        let tall = DynamicImage::ImageRgb8(RgbImage::new(300, 900));
        let out = optimizer().optimize(&candidate(tall)).unwrap();
        assert_eq!(out.height, 300);
        assert_eq!(out.width, 100);
    }

    #[test]
    fn test_never_upscales() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(50, 40));
        let out = optimizer().optimize(&candidate(input)).unwrap();
        assert_eq!((out.width, out.height), (50, 40));
    }

    #[test]
    fn test_alpha_is_flattened_onto_white() {
        let transparent = RgbaImage::from_pixel(800, 600, Rgba([0, 0, 0, 0]));
        let out = optimizer()
            .optimize(&candidate(DynamicImage::ImageRgba8(transparent)))
            .unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert!(!decoded.color().has_alpha());
        let px = decoded.to_rgb8().get_pixel(200, 150).0;
        assert!(px.iter().all(|c| *c > 245), "expected white, got {px:?}");
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut img = RgbImage::new(640, 480);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let c = candidate(DynamicImage::ImageRgb8(img));
        let a = optimizer().optimize(&c).unwrap();
        let b = optimizer().optimize(&c).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_corrupt_input_is_unresolvable() {
        let c = ImageCandidate {
            source: ImageSource::InBody,
            url: "https://img.example.com/broken.jpg".to_string(),
            raw_bytes: b"\xff\xd8\xff garbage".to_vec(),
            width: 0,
            height: 0,
        };
        let err = optimizer().optimize(&c).unwrap_err();
        assert!(matches!(err, PipelineError::ImageUnresolvable(_)));
    }

    #[test]
    fn test_flatten_blend() {
        let half = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten(&DynamicImage::ImageRgba8(half));
        let px = flat.get_pixel(0, 0).0;
        assert_eq!(px, [127, 127, 127]);
    }
}
