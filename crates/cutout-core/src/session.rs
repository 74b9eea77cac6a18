//! The external segmentation engine, as seen from the core.
//!
//! The engine (model load, embedding, per-click inference) is opaque. These
//! traits describe exactly what the core calls on it. Browser bindings
//! live in `cutout-io`; tests use in-memory fakes.
//!
//! Futures are `'static` and `!Send`: engines are driven from a single
//! thread and must not borrow their arguments past the call.

use futures::future::LocalBoxFuture;

use crate::types::{Click, PixelMask, RgbaImage};

/// A per-image inference session holding an ordered list of clicks.
///
/// The session is exclusive: [`segment`](Self::segment) must never run
/// concurrently with any other call on the same session. The
/// [`Segmenter`](crate::segmenter::Segmenter) guarantees that by routing
/// every call through an [`OperationQueue`](crate::queue::OperationQueue).
pub trait SegmentationSession {
    /// Inference failure.
    type Error: std::error::Error + 'static;

    /// Append a prompt click.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the click was not recorded.
    fn add_click(&self, click: Click) -> Result<(), Self::Error>;

    /// Drop the most recent click.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the click list was not changed.
    fn remove_last_click(&self) -> Result<(), Self::Error>;

    /// Forget all clicks.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the session could not be reset.
    fn reset(&self) -> Result<(), Self::Error>;

    /// Run inference for the current clicks.
    fn segment(&self, image: &RgbaImage) -> LocalBoxFuture<'static, Result<PixelMask, Self::Error>>;

    /// Release engine resources. No other call follows.
    fn dispose(&self);
}

/// Factory for [`SegmentationSession`]s.
pub trait SegmentationEngine {
    /// Session type produced by this engine.
    type Session: SegmentationSession;

    /// Load or setup failure.
    type Error: std::error::Error + 'static;

    /// Load the model. Safe to call more than once.
    fn init(&self) -> LocalBoxFuture<'static, Result<(), Self::Error>>;

    /// Compute and cache the image embedding ahead of the first click.
    fn precompute_embedding(&self, image: &RgbaImage)
    -> LocalBoxFuture<'static, Result<(), Self::Error>>;

    /// Open a session for `image`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the session cannot be created.
    fn create_session(&self, image: &RgbaImage) -> Result<Self::Session, Self::Error>;
}
