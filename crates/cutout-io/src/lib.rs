//! cutout-io: Browser bindings for the cutout core.
//!
//! Binds the JavaScript segmentation engine to the core traits, runs the
//! operation queue on the browser event loop, and handles Blob URLs and
//! file downloads for encoded rasters.
//!
//! UI glue should treat [`QueueError::is_cancellation`] as "ignore":
//! a superseded or cleared click is not a failure.
//!
//! [`QueueError::is_cancellation`]: cutout_core::QueueError::is_cancellation

pub mod download;
pub mod engine;
pub mod raster;
pub mod spawner;

pub use download::{DownloadError, download_raster, trigger_download};
pub use engine::{
    BrowserSegmenter, EngineError, JsSegmentationEngine, JsSegmentationSession,
    open_browser_segmenter,
};
pub use raster::{
    RasterError, mask_overlay_blob_url, raster_from_image_data, raster_to_blob, raster_to_blob_url,
    raster_to_image_data, revoke_blob_url,
};
pub use spawner::BrowserSpawner;
