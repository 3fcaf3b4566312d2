/// Codec adapter
///
/// Wraps decode / scale / encode for every supported raster format behind
/// the [`Codec`] trait so the generator never touches per-format quirks.

use crate::error::IngestError;
use crate::ingest::policy::{OutputFormat, SourceFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest)
const AVIF_SPEED: u8 = 8;

/// A decoded image. Owned by exactly one ingest call.
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: DynamicImage,
}

impl Bitmap {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Dimensions after fitting the longest edge into `max_edge`.
///
/// Never upscales. The longer side lands exactly on `max_edge`, the shorter
/// one is rounded and kept at least 1px. A `max_edge` of 0 sets no bound.
pub fn fit_longest_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max_edge == 0 || longest <= max_edge || width == 0 || height == 0 {
        return (width, height);
    }
    let scale = f64::from(max_edge) / f64::from(longest);
    let shorten = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_edge);
    if width >= height {
        (max_edge, shorten(height))
    } else {
        (shorten(width), max_edge)
    }
}

/// Decode / scale / encode primitives
pub trait Codec: Send + Sync {
    fn decode(&self, bytes: &[u8], format: SourceFormat) -> Result<Bitmap, IngestError>;

    /// Fit `bitmap` into `max_edge`; borrowed back unchanged when it already fits
    fn scale<'a>(&self, bitmap: &'a Bitmap, max_edge: u32) -> Cow<'a, Bitmap> {
        let (width, height) = bitmap.dimensions();
        let target = fit_longest_edge(width, height, max_edge);
        if target == (width, height) {
            return Cow::Borrowed(bitmap);
        }
        let resized = bitmap
            .image()
            .resize_exact(target.0, target.1, FilterType::Lanczos3);
        Cow::Owned(Bitmap::new(resized))
    }

    /// Quality is 0-100; 0 asks for the smallest file
    fn encode(
        &self,
        bitmap: &Bitmap,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, IngestError>;
}

/// [`Codec`] backed by the `image` crate (+ libwebp for lossy WebP)
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8], format: SourceFormat) -> Result<Bitmap, IngestError> {
        let image_format = raster_format(format).ok_or_else(|| IngestError::Decode {
            format: format.to_string(),
            reason: "format cannot be rasterized".to_string(),
        })?;

        let image = image::load_from_memory_with_format(bytes, image_format).map_err(|e| {
            IngestError::Decode {
                format: format.to_string(),
                reason: e.to_string(),
            }
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(IngestError::Decode {
                format: format.to_string(),
                reason: "image has no pixels".to_string(),
            });
        }
        Ok(Bitmap::new(image))
    }

    fn encode(
        &self,
        bitmap: &Bitmap,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, IngestError> {
        let image = bitmap.image();
        let mut out = Vec::new();
        let result = match format {
            OutputFormat::Webp => return encode_webp(image, quality),
            // JPEG has no alpha channel and no quality 0
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
                DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
            }
            // lossless, quality does not apply
            OutputFormat::Png => {
                let encoder = PngEncoder::new(&mut out);
                eight_bit(image).write_with_encoder(encoder)
            }
            OutputFormat::Avif => {
                let encoder =
                    AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality.clamp(1, 100));
                DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)
            }
            OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), ImageFormat::Gif),
            OutputFormat::Bmp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), ImageFormat::Bmp),
        };

        result.map_err(|e| IngestError::Encode {
            format: format.to_string(),
            reason: e.to_string(),
        })?;
        Ok(out)
    }
}

/// libwebp lossy encode; only 8-bit RGB/RGBA buffers are accepted
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, IngestError> {
    let converted;
    let source = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let encoder = webp::Encoder::from_image(source).map_err(|e| IngestError::Encode {
        format: OutputFormat::Webp.to_string(),
        reason: e.to_string(),
    })?;
    let memory = encoder
        .encode_simple(false, f32::from(quality.min(100)))
        .map_err(|e| IngestError::Encode {
            format: OutputFormat::Webp.to_string(),
            reason: format!("{e:?}"),
        })?;
    Ok(memory.to_vec())
}

/// PNG accepts 8 and 16 bit; float buffers are narrowed
fn eight_bit(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
        }
        _ => Cow::Borrowed(image),
    }
}

fn raster_format(format: SourceFormat) -> Option<ImageFormat> {
    match format {
        SourceFormat::Jpeg => Some(ImageFormat::Jpeg),
        SourceFormat::Png => Some(ImageFormat::Png),
        SourceFormat::Webp => Some(ImageFormat::WebP),
        SourceFormat::Avif => Some(ImageFormat::Avif),
        SourceFormat::Bmp => Some(ImageFormat::Bmp),
        SourceFormat::Gif => Some(ImageFormat::Gif),
        SourceFormat::Svg => None,
    }
}

/// Cheap content check for bytes that are stored without decoding
pub fn check_signature(bytes: &[u8], format: SourceFormat) -> Result<(), IngestError> {
    let matches = match format {
        SourceFormat::Svg => std::str::from_utf8(bytes)
            .map(|text| text.contains("<svg"))
            .unwrap_or(false),
        other => image::guess_format(bytes).ok() == raster_format(other),
    };
    if matches {
        Ok(())
    } else {
        Err(IngestError::Decode {
            format: format.to_string(),
            reason: "content does not match the declared type".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let noise = ((x * 7919 + y * 104_729) % 61) as u8;
            Rgb([(x % 256) as u8, (y % 256) as u8, noise.wrapping_mul(4)])
        }))
    }

    fn encoded(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn test_fit_longest_edge() {
        assert_eq!(fit_longest_edge(4000, 3000, 1920), (1920, 1440));
        assert_eq!(fit_longest_edge(3000, 4000, 500), (375, 500));
        assert_eq!(fit_longest_edge(500, 500, 500), (500, 500));
        assert_eq!(fit_longest_edge(300, 200, 500), (300, 200));
        assert_eq!(fit_longest_edge(10_000, 3, 500), (500, 1));
    }

    #[test]
    fn test_fit_zero_edge_is_unbounded() {
        assert_eq!(fit_longest_edge(4000, 3000, 0), (4000, 3000));
        assert_eq!(fit_longest_edge(1, 1, 0), (1, 1));
    }

    #[test]
    fn test_fit_preserves_aspect_within_one_pixel() {
        for (w, h) in [(4032, 3024), (1081, 1919), (2001, 999), (7000, 13), (641, 640)] {
            for max_edge in [500, 1920] {
                let (nw, nh) = fit_longest_edge(w, h, max_edge);
                assert!(nw.max(nh) <= max_edge);
                assert!(nw <= w && nh <= h);
                let expected_h = f64::from(nw) * f64::from(h) / f64::from(w);
                let expected_w = f64::from(nh) * f64::from(w) / f64::from(h);
                assert!(
                    (f64::from(nh) - expected_h).abs() <= 1.0
                        || (f64::from(nw) - expected_w).abs() <= 1.0,
                    "{w}x{h} -> {nw}x{nh}"
                );
            }
        }
    }

    #[test]
    fn test_scale_is_noop_when_within_bounds() {
        let bitmap = Bitmap::new(gradient(120, 80));
        let scaled = ImageCodec.scale(&bitmap, 500);
        assert!(matches!(scaled, Cow::Borrowed(_)));
        assert_eq!(scaled.dimensions(), (120, 80));
    }

    #[test]
    fn test_scale_portrait() {
        let bitmap = Bitmap::new(gradient(60, 240));
        let scaled = ImageCodec.scale(&bitmap, 100);
        assert_eq!(scaled.dimensions(), (25, 100));
    }

    #[test]
    fn test_decode_each_raster_format() {
        let source = gradient(40, 30);
        for (format, image_format) in [
            (SourceFormat::Png, ImageFormat::Png),
            (SourceFormat::Jpeg, ImageFormat::Jpeg),
            (SourceFormat::Bmp, ImageFormat::Bmp),
            (SourceFormat::Gif, ImageFormat::Gif),
            (SourceFormat::Webp, ImageFormat::WebP),
        ] {
            let bytes = if image_format == ImageFormat::Gif {
                encoded(&DynamicImage::ImageRgba8(source.to_rgba8()), image_format)
            } else {
                encoded(&source, image_format)
            };
            let bitmap = ImageCodec.decode(&bytes, format).unwrap();
            assert_eq!(bitmap.dimensions(), (40, 30), "{format}");
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = ImageCodec
            .decode(b"definitely not a png", SourceFormat::Png)
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn test_decode_svg_is_refused() {
        let err = ImageCodec
            .decode(b"<svg xmlns='http://www.w3.org/2000/svg'/>", SourceFormat::Svg)
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn test_encode_outputs_decode_back() {
        let bitmap = Bitmap::new(gradient(64, 48));
        for (format, image_format) in [
            (OutputFormat::Webp, ImageFormat::WebP),
            (OutputFormat::Jpeg, ImageFormat::Jpeg),
            (OutputFormat::Png, ImageFormat::Png),
            (OutputFormat::Gif, ImageFormat::Gif),
            (OutputFormat::Bmp, ImageFormat::Bmp),
        ] {
            let bytes = ImageCodec.encode(&bitmap, format, 85).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), image_format);
            let back = image::load_from_memory_with_format(&bytes, image_format).unwrap();
            assert_eq!((back.width(), back.height()), (64, 48), "{format}");
        }
    }

    #[test]
    fn test_encode_avif() {
        let bitmap = Bitmap::new(gradient(16, 16));
        let bytes = ImageCodec.encode(&bitmap, OutputFormat::Avif, 85).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Avif);
    }

    #[test]
    fn test_zero_quality_is_smaller() {
        let bitmap = Bitmap::new(gradient(256, 256));
        let low = ImageCodec.encode(&bitmap, OutputFormat::Webp, 0).unwrap();
        let high = ImageCodec.encode(&bitmap, OutputFormat::Webp, 100).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128])));
        let bytes = ImageCodec
            .encode(&Bitmap::new(rgba), OutputFormat::Jpeg, 0)
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_check_signature() {
        let gif = encoded(
            &DynamicImage::ImageRgba8(RgbaImage::new(2, 2)),
            ImageFormat::Gif,
        );
        assert!(check_signature(&gif, SourceFormat::Gif).is_ok());
        assert!(check_signature(b"GIF? no", SourceFormat::Gif).is_err());

        let svg = br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"></svg>"#;
        assert!(check_signature(svg, SourceFormat::Svg).is_ok());
        assert!(check_signature(b"<html></html>", SourceFormat::Svg).is_err());
        assert!(check_signature(&[0xff, 0xfe, 0x00], SourceFormat::Svg).is_err());
    }
}
