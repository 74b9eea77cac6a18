//! Click-driven segmentation on top of the operation queue.
//!
//! [`Segmenter`] owns the loaded image, its session, and the ordered click
//! list. Every edit (click, undo, reset) updates the list and queues a
//! segmentation run. A run brings the session's clicks in line with a
//! snapshot of the list taken when it was queued, then segments, so all
//! session mutation happens inside the single-flight region and a
//! superseded run never touches the session at all.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use futures::task::LocalSpawn;
use tracing::debug;

use crate::queue::{OperationQueue, Ticket};
use crate::session::{SegmentationEngine, SegmentationSession};
use crate::types::{Click, PixelMask, RgbaImage, SegmentError};

/// Outcome of a queued segmentation run.
///
/// Settles with `None` when the run had no clicks to segment.
pub type MaskTicket<E> = Ticket<Option<PixelMask>, E>;

/// Disposes the wrapped session when the last reference goes away.
///
/// Queued runs hold their own reference, so a session replaced while a
/// run is in flight is disposed only after that run finishes.
struct OwnedSession<S: SegmentationSession>(S);

impl<S: SegmentationSession> Deref for OwnedSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S: SegmentationSession> Drop for OwnedSession<S> {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

struct Loaded<S: SegmentationSession> {
    image: Rc<RgbaImage>,
    session: Rc<OwnedSession<S>>,
    /// Clicks the session currently holds, or `None` after a failed sync
    /// left them unknown. Only touched inside queued runs.
    applied: Rc<RefCell<Option<Vec<Click>>>>,
}

/// Interactive click-to-segment state for one image at a time.
pub struct Segmenter<S: SegmentationSession> {
    queue: OperationQueue<Option<PixelMask>, S::Error>,
    loaded: Option<Loaded<S>>,
    clicks: Vec<Click>,
}

impl<S: SegmentationSession + 'static> Segmenter<S> {
    /// Create a segmenter with no image loaded.
    #[must_use]
    pub fn new(spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            queue: OperationQueue::new(spawner),
            loaded: None,
            clicks: Vec::new(),
        }
    }

    /// Switch to a new image and its session.
    ///
    /// Pending runs are cleared and the click list emptied. The previous
    /// session is disposed once no run is using it.
    pub fn load(&mut self, image: RgbaImage, session: S) {
        self.queue.clear();
        self.clicks.clear();
        debug!(
            width = image.width(),
            height = image.height(),
            "segmentation image loaded"
        );
        self.loaded = Some(Loaded {
            image: Rc::new(image),
            session: Rc::new(OwnedSession(session)),
            applied: Rc::new(RefCell::new(Some(Vec::new()))),
        });
    }

    /// Drop the current image and session.
    pub fn unload(&mut self) {
        self.queue.clear();
        self.clicks.clear();
        self.loaded = None;
    }

    /// The loaded image, if any.
    #[must_use]
    pub fn image(&self) -> Option<&RgbaImage> {
        self.loaded.as_ref().map(|loaded| loaded.image.as_ref())
    }

    /// The clicks, oldest first.
    #[must_use]
    pub fn clicks(&self) -> &[Click] {
        &self.clicks
    }

    /// Whether a segmentation run is in flight or about to start.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.queue.is_processing()
    }

    /// Runs waiting behind the in-flight one.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.queue.queue_length()
    }

    /// Add a click and re-segment.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NoImage`] without an image, or
    /// [`SegmentError::ClickOutOfBounds`] if the click misses it. The
    /// click list is unchanged on error.
    pub fn add_click(&mut self, click: Click) -> Result<MaskTicket<S::Error>, SegmentError> {
        let (width, height) = self.loaded()?.image.dimensions();
        if !click.is_within(width, height) {
            return Err(SegmentError::ClickOutOfBounds {
                x: click.x,
                y: click.y,
                width,
                height,
            });
        }
        self.clicks.push(click);
        debug!(x = click.x, y = click.y, kind = %click.kind, clicks = self.clicks.len(), "click added");
        self.resegment()
    }

    /// Remove the most recent click and re-segment.
    ///
    /// With no clicks left the run settles with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NoImage`] without an image.
    pub fn undo(&mut self) -> Result<MaskTicket<S::Error>, SegmentError> {
        self.loaded()?;
        self.clicks.pop();
        self.resegment()
    }

    /// Remove every click. The queued run resets the session and settles
    /// with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NoImage`] without an image.
    pub fn reset(&mut self) -> Result<MaskTicket<S::Error>, SegmentError> {
        self.loaded()?;
        self.clicks.clear();
        self.resegment()
    }

    /// Queue a segmentation run for the current clicks.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::NoImage`] without an image.
    pub fn resegment(&self) -> Result<MaskTicket<S::Error>, SegmentError> {
        let loaded = self.loaded()?;
        let image = Rc::clone(&loaded.image);
        let session = Rc::clone(&loaded.session);
        let applied = Rc::clone(&loaded.applied);
        let target = self.clicks.clone();

        Ok(self
            .queue
            .enqueue(move || run_segmentation(session, applied, image, target)))
    }

    fn loaded(&self) -> Result<&Loaded<S>, SegmentError> {
        self.loaded.as_ref().ok_or(SegmentError::NoImage)
    }
}

/// One queued run: sync the session to `target`, then segment.
#[allow(clippy::future_not_send)] // sessions are !Send
async fn run_segmentation<S: SegmentationSession>(
    session: Rc<OwnedSession<S>>,
    applied: Rc<RefCell<Option<Vec<Click>>>>,
    image: Rc<RgbaImage>,
    target: Vec<Click>,
) -> Result<Option<PixelMask>, S::Error> {
    sync_clicks(&**session, &mut applied.borrow_mut(), &target)?;
    if target.is_empty() {
        return Ok(None);
    }
    session.segment(&image).await.map(Some)
}

/// Make the session hold exactly `target`, reusing the longest common
/// prefix of what it already holds.
///
/// `applied` is `None` while the session's clicks are unknown. It stays
/// `None` if any session call fails, so the next sync starts with a
/// reset and replays every click.
fn sync_clicks<S: SegmentationSession>(
    session: &S,
    applied: &mut Option<Vec<Click>>,
    target: &[Click],
) -> Result<(), S::Error> {
    let known = applied.take();
    let common = known.as_deref().map_or(0, |held| {
        held.iter().zip(target).take_while(|(a, b)| a == b).count()
    });
    let mut held = match known {
        Some(held) if common > 0 || (held.is_empty() && !target.is_empty()) => held,
        _ => {
            session.reset()?;
            Vec::new()
        }
    };

    while held.len() > common {
        session.remove_last_click()?;
        held.pop();
    }
    for &click in &target[common..] {
        session.add_click(click)?;
        held.push(click);
    }
    *applied = Some(held);
    Ok(())
}

/// Load the engine, embed `image`, and return a segmenter ready for clicks.
///
/// # Errors
///
/// Returns the engine's error from any of the three setup steps.
#[allow(clippy::future_not_send)] // engines are !Send
pub async fn open_segmenter<G>(
    engine: &G,
    image: RgbaImage,
    spawner: Rc<dyn LocalSpawn>,
) -> Result<Segmenter<G::Session>, G::Error>
where
    G: SegmentationEngine,
    G::Session: 'static,
{
    engine.init().await?;
    engine.precompute_embedding(&image).await?;
    let session = engine.create_session(&image)?;

    let mut segmenter = Segmenter::new(spawner);
    segmenter.load(image, session);
    Ok(segmenter)
}
