//! File download via Blob URLs.
//!
//! Browsers have no direct "save file" API. This module triggers
//! downloads by creating a `Blob`, generating an object URL, and
//! programmatically clicking a temporary `<a>` element.
//!
//! All functions in this module require a browser environment
//! (`wasm32-unknown-unknown` target).

use cutout_core::{CodecError, EncodeFormat, RgbaImage};
use tracing::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;

use crate::raster::blob_from_bytes;

/// Errors that can occur when triggering a file download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Encoding the raster failed.
    #[error("raster encoding failed: {0}")]
    Encode(#[from] CodecError),

    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for DownloadError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

/// Trigger a file download in the browser.
///
/// Creates a `Blob` from `data`, generates an object URL, and
/// programmatically clicks a temporary `<a download="filename">` element.
/// The object URL is revoked after the click.
///
/// # Errors
///
/// Returns [`DownloadError::JsError`] if any browser API call fails
/// (e.g., `Blob` creation, `URL.createObjectURL`, element creation).
pub fn trigger_download(data: &[u8], filename: &str, mime_type: &str) -> Result<(), DownloadError> {
    let window =
        web_sys::window().ok_or_else(|| DownloadError::JsError("no global window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| DownloadError::JsError("no document".into()))?;

    let blob = blob_from_bytes(data, mime_type)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;

    let anchor: web_sys::HtmlAnchorElement = document
        .create_element("a")?
        .dyn_into::<web_sys::HtmlAnchorElement>()
        .map_err(|e| DownloadError::JsError(format!("failed to cast element: {e:?}")))?;

    anchor.set_href(&url);
    anchor.set_download(filename);

    let body = document
        .body()
        .ok_or_else(|| DownloadError::JsError("no document body".into()))?;
    body.append_child(&anchor)?;
    anchor.click();

    // The download has started; cleanup failures are not download failures.
    let _ = body.remove_child(&anchor);
    let _ = web_sys::Url::revoke_object_url(&url);

    debug!(filename, mime_type, bytes = data.len(), "download triggered");
    Ok(())
}

/// Encode a raster and download it as `filename`.
///
/// # Errors
///
/// Returns [`DownloadError::Encode`] if encoding fails, otherwise as
/// [`trigger_download`].
pub fn download_raster(
    raster: &RgbaImage,
    format: EncodeFormat,
    quality: u8,
    filename: &str,
) -> Result<(), DownloadError> {
    let bytes = cutout_core::encode_raster(raster, format, quality)?;
    trigger_download(&bytes, filename, format.mime_type())
}
