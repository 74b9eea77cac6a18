//! Raster encoding to Blobs and Blob URLs.
//!
//! Encodes `RgbaImage` data with [`cutout_core::encode_raster`] and wraps
//! the bytes in browser `Blob`s and object URLs. Also converts between
//! rasters and canvas `ImageData`.

use cutout_core::{CodecError, EncodeFormat, OverlayColor, PixelMask, RgbaImage, composite_overlay};
use wasm_bindgen::{Clamped, JsValue};
use web_sys::{Blob, BlobPropertyBag, ImageData};

/// Errors that can occur during raster-to-Blob conversion.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// Encoding the raster failed.
    #[error("raster encoding failed: {0}")]
    Encode(#[from] CodecError),

    /// `ImageData` did not hold `width * height * 4` bytes.
    #[error("image data has {actual} bytes, expected {expected}")]
    DataLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for RasterError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// Wrap already-encoded bytes in a `Blob` of the given MIME type.
pub(crate) fn blob_from_bytes(bytes: &[u8], mime_type: &str) -> Result<Blob, JsValue> {
    let uint8_array = js_sys::Uint8Array::from(bytes);
    let parts = js_sys::Array::new();
    parts.push(&uint8_array);

    let opts = BlobPropertyBag::new();
    opts.set_type(mime_type);
    Blob::new_with_u8_array_sequence_and_options(&parts, &opts)
}

/// Encode a raster into a `Blob`.
///
/// `quality` only affects JPEG (see [`cutout_core::encode_raster`]).
///
/// # Errors
///
/// Returns [`RasterError::Encode`] if encoding fails.
/// Returns [`RasterError::JsError`] if Blob creation fails.
pub fn raster_to_blob(
    raster: &RgbaImage,
    format: EncodeFormat,
    quality: u8,
) -> Result<Blob, RasterError> {
    let bytes = cutout_core::encode_raster(raster, format, quality)?;
    Ok(blob_from_bytes(&bytes, format.mime_type())?)
}

/// Encode a raster as a Blob URL for use as an `<img src>`.
///
/// The returned URL must be revoked via [`revoke_blob_url`] when no
/// longer needed to avoid memory leaks.
///
/// # Errors
///
/// Returns [`RasterError::Encode`] if encoding fails.
/// Returns [`RasterError::JsError`] if Blob or URL creation fails.
pub fn raster_to_blob_url(
    raster: &RgbaImage,
    format: EncodeFormat,
    quality: u8,
) -> Result<String, RasterError> {
    let blob = raster_to_blob(raster, format, quality)?;
    Ok(web_sys::Url::create_object_url_with_blob(&blob)?)
}

/// Tint a mask with `color` and return it as a PNG Blob URL, ready to
/// layer over the source image.
///
/// # Errors
///
/// Same as [`raster_to_blob_url`].
pub fn mask_overlay_blob_url(mask: &PixelMask, color: OverlayColor) -> Result<String, RasterError> {
    raster_to_blob_url(&composite_overlay(mask, color), EncodeFormat::Png, 0)
}

/// Revoke a Blob URL previously created by [`raster_to_blob_url`] or
/// [`mask_overlay_blob_url`].
///
/// Best-effort: failures are silently ignored since the URL may have
/// already been revoked or garbage collected.
pub fn revoke_blob_url(url: &str) {
    let _ = web_sys::Url::revoke_object_url(url);
}

/// Copy a raster into a new canvas `ImageData`.
///
/// # Errors
///
/// Returns [`RasterError::JsError`] if the browser rejects the
/// dimensions (for example a zero-sized raster).
pub fn raster_to_image_data(raster: &RgbaImage) -> Result<ImageData, RasterError> {
    Ok(ImageData::new_with_u8_clamped_array_and_sh(
        Clamped(raster.as_raw().as_slice()),
        raster.width(),
        raster.height(),
    )?)
}

/// Copy canvas `ImageData` (for example from `getImageData`) into a raster.
///
/// # Errors
///
/// Returns [`RasterError::DataLength`] if the pixel buffer does not match
/// the reported dimensions.
pub fn raster_from_image_data(data: &ImageData) -> Result<RgbaImage, RasterError> {
    let Clamped(bytes) = data.data();
    raster_from_parts(data.width(), data.height(), bytes)
}

/// Build a raster from RGBA bytes of exactly `width * height * 4`.
fn raster_from_parts(width: u32, height: u32, bytes: Vec<u8>) -> Result<RgbaImage, RasterError> {
    let actual = bytes.len();
    let expected = usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .and_then(|n| n.checked_mul(4));
    match expected {
        Some(expected) if expected == actual => RgbaImage::from_raw(width, height, bytes)
            .ok_or(RasterError::DataLength { expected, actual }),
        Some(expected) => Err(RasterError::DataLength { expected, actual }),
        None => Err(RasterError::DataLength {
            expected: usize::MAX,
            actual,
        }),
    }
}
