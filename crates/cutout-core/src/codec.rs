//! Image decoding and raster encoding.
//!
//! The sans-IO half of exporting a cutout: rasters in, encoded bytes out.
//! Wrapping the bytes in a browser `Blob` happens in `cutout-io`.

use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::types::PixelMask;

/// JPEG quality used when the caller has no preference. Matches the
/// browser default for `canvas.toBlob`.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Errors from decoding or encoding image bytes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Empty input buffer.
    #[error("input image data is empty")]
    EmptyInput,

    /// The codec rejected the data.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Output encoding for an exported raster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
    /// Lossless with alpha.
    #[default]
    Png,
    /// Lossy, no alpha.
    Jpeg,
    /// Lossless WebP with alpha.
    WebP,
}

impl EncodeFormat {
    /// MIME type for the encoded bytes.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Look up a format by MIME type (case-insensitive).
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Look up a format by file extension (case-insensitive, no dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Encode a raster.
///
/// PNG and WebP keep the alpha channel and ignore `quality`. JPEG has no
/// alpha, so pixels are flattened onto black the way a canvas does, and
/// `quality` is clamped to `1..=100`.
///
/// # Errors
///
/// Returns [`CodecError::Image`] if the encoder fails (for example on a
/// zero-sized raster).
pub fn encode_raster(
    raster: &RgbaImage,
    format: EncodeFormat,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    let (width, height) = raster.dimensions();
    let mut bytes = Vec::new();
    match format {
        EncodeFormat::Png => {
            image::codecs::png::PngEncoder::new(&mut bytes).write_image(
                raster.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
        EncodeFormat::Jpeg => {
            let flat = flatten_onto_black(raster);
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
                .write_image(flat.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
        EncodeFormat::WebP => {
            image::codecs::webp::WebPEncoder::new_lossless(&mut bytes).write_image(
                raster.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )?;
        }
    }
    Ok(bytes)
}

/// Decode PNG, JPEG, BMP, or WebP bytes into an RGBA raster.
///
/// # Errors
///
/// Returns [`CodecError::EmptyInput`] if `bytes` is empty, or
/// [`CodecError::Image`] if the format is unrecognized or corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Decode a stored mask.
///
/// Images with an alpha channel are used as-is. Images without one are
/// treated as grayscale coverage maps (see [`PixelMask::from_luma`]).
///
/// # Errors
///
/// Same as [`decode_rgba`].
pub fn decode_mask(bytes: &[u8]) -> Result<PixelMask, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    let decoded = image::load_from_memory(bytes)?;
    if decoded.color().has_alpha() {
        Ok(PixelMask::from_image(decoded.to_rgba8()))
    } else {
        Ok(PixelMask::from_luma(&decoded.to_luma8()))
    }
}

/// Premultiply color by alpha, dropping the alpha channel.
fn flatten_onto_black(raster: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(raster.width(), raster.height(), |x, y| {
        let [r, g, b, a] = raster.get_pixel(x, y).0;
        let scale = |c: u8| {
            // (c * a) / 255 <= 255, so the narrowing is lossless.
            #[expect(clippy::cast_possible_truncation)]
            let v = (u16::from(c) * u16::from(a) / 255) as u8;
            v
        };
        Rgb([scale(r), scale(g), scale(b)])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma, Rgba};

    use super::*;

    fn sample_raster() -> RgbaImage {
        RgbaImage::from_fn(5, 3, |x, y| {
            if x < 2 {
                Rgba([200, 100, 50, 0])
            } else {
                Rgba([10, 20, 30, if y == 0 { 128 } else { 255 }])
            }
        })
    }

    #[test]
    fn png_preserves_alpha() {
        let raster = sample_raster();
        let bytes = encode_raster(&raster, EncodeFormat::Png, 0).unwrap();
        assert_eq!(decode_rgba(&bytes).unwrap(), raster);
    }

    #[test]
    fn webp_is_lossless_with_alpha() {
        let raster = sample_raster();
        let bytes = encode_raster(&raster, EncodeFormat::WebP, 10).unwrap();
        let decoded = decode_rgba(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (5, 3));
        for (a, b) in decoded.pixels().zip(raster.pixels()) {
            assert_eq!(a.0[3], b.0[3]);
        }
    }

    #[test]
    fn jpeg_drops_alpha_by_flattening() {
        let raster = RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([255, 255, 255, 0])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let bytes = encode_raster(&raster, EncodeFormat::Jpeg, 95).unwrap();
        let decoded = decode_rgba(&bytes).unwrap();

        assert_eq!(decoded.dimensions(), (16, 16));
        assert!(decoded.pixels().all(|p| p.0[3] == 255));
        // Transparent white flattens to black; opaque white stays white.
        assert!(decoded.get_pixel(2, 8).0[0] < 32);
        assert!(decoded.get_pixel(13, 8).0[0] > 223);
    }

    #[test]
    fn jpeg_quality_zero_is_clamped() {
        let raster = sample_raster();
        assert!(encode_raster(&raster, EncodeFormat::Jpeg, 0).is_ok());
    }

    #[test]
    fn flatten_scales_by_alpha() {
        let raster = RgbaImage::from_fn(1, 1, |_, _| Rgba([255, 100, 0, 128]));
        assert_eq!(flatten_onto_black(&raster).get_pixel(0, 0), &Rgb([128, 50, 0]));
    }

    #[test]
    fn mime_type_lookup() {
        assert_eq!(EncodeFormat::from_mime_type("image/png"), Some(EncodeFormat::Png));
        assert_eq!(EncodeFormat::from_mime_type(" Image/JPG "), Some(EncodeFormat::Jpeg));
        assert_eq!(EncodeFormat::from_mime_type("image/webp"), Some(EncodeFormat::WebP));
        assert_eq!(EncodeFormat::from_mime_type("image/gif"), None);
        for format in [EncodeFormat::Png, EncodeFormat::Jpeg, EncodeFormat::WebP] {
            assert_eq!(EncodeFormat::from_mime_type(format.mime_type()), Some(format));
            assert_eq!(EncodeFormat::from_extension(format.extension()), Some(format));
        }
    }

    #[test]
    fn empty_input_is_reported() {
        assert!(matches!(decode_rgba(&[]), Err(CodecError::EmptyInput)));
        assert!(matches!(decode_mask(&[]), Err(CodecError::EmptyInput)));
    }

    #[test]
    fn corrupt_input_is_a_codec_error() {
        assert!(matches!(
            decode_rgba(&[0xFF, 0xFE, 0x00, 0x01]),
            Err(CodecError::Image(_))
        ));
    }

    #[test]
    fn grayscale_mask_uses_luma_as_alpha() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[0, 90, 255][x as usize]]));
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(gray.as_raw(), 3, 1, ExtendedColorType::L8)
            .unwrap();

        let mask = decode_mask(&bytes).unwrap();

        assert_eq!(mask.alpha_at(0, 0), Some(0));
        assert_eq!(mask.alpha_at(1, 0), Some(90));
        assert_eq!(mask.alpha_at(2, 0), Some(255));
    }

    #[test]
    fn alpha_mask_is_used_as_is() {
        let raster = sample_raster();
        let bytes = encode_raster(&raster, EncodeFormat::Png, 0).unwrap();
        let mask = decode_mask(&bytes).unwrap();
        assert_eq!(mask.as_image(), &raster);
    }

    #[test]
    fn format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EncodeFormat::WebP).unwrap(), r#""webp""#);
    }
}
