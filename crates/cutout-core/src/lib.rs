//! cutout-core: Click-to-segment core (sans-IO).
//!
//! Two halves:
//!
//! - [`queue`] and [`segmenter`]: a single-flight operation queue with a
//!   "latest request wins" policy, and the click/undo/reset driver that
//!   routes every call into an exclusive inference session through it.
//! - [`mask`] and [`codec`]: pure raster algebra on alpha-channel masks
//!   (content bounds, overlay, cutout, trim) and image encoding.
//!
//! This crate has **no I/O dependencies**. The segmentation engine is a
//! pair of traits ([`session`]); browser bindings, Blob URLs and downloads
//! live in `cutout-io`.

pub mod codec;
pub mod mask;
pub mod queue;
pub mod segmenter;
pub mod session;
pub mod types;

pub use codec::{CodecError, DEFAULT_JPEG_QUALITY, EncodeFormat, decode_mask, decode_rgba, encode_raster};
pub use mask::{apply_mask_to_image, composite_overlay, compute_bounds, content_bounds, trim_to_content};
pub use queue::{OperationQueue, QueueError, Ticket};
pub use segmenter::{MaskTicket, Segmenter, open_segmenter};
pub use session::{SegmentationEngine, SegmentationSession};
pub use types::{
    Bounds, Click, ClickKind, ExtractOptions, GrayImage, MaskError, OverlayColor, ParseColorError,
    PixelMask, RgbaImage, SegmentError,
};
