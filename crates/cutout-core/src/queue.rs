//! Single-flight operation queue with latest-wins preemption.
//!
//! The segmentation engine is stateful and refuses overlapping calls,
//! while clicks arrive faster than inference finishes. [`OperationQueue`]
//! runs at most one operation at a time, and every [`enqueue`] first
//! cancels whatever is still waiting, so only the newest request is
//! ever run next. The operation already in flight is never interrupted.
//!
//! Everything is single-threaded: state lives in `Rc<RefCell<..>>` and
//! is shared only with the queue's own drain task, which runs on the
//! [`LocalSpawn`] handle passed to [`OperationQueue::new`]. No borrow of
//! that state is ever held across an `.await`.
//!
//! [`enqueue`]: OperationQueue::enqueue

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{LocalSpawn, LocalSpawnExt};
use tracing::{debug, error};
use web_time::Instant;

/// Why a [`Ticket`] settled without the operation's own result.
///
/// The first three variants mean the work was never done, which is
/// expected under latest-wins and usually not worth reporting to a
/// user. [`Operation`](Self::Operation) is a real failure.
#[derive(Debug, thiserror::Error)]
pub enum QueueError<E> {
    /// A newer request arrived before this one started.
    #[error("operation cancelled: superseded by newer request")]
    Cancelled,

    /// [`OperationQueue::clear`] discarded the operation before it started.
    #[error("operation cancelled: queue cleared")]
    Cleared,

    /// The queue was dropped, or could not spawn its drain task, before
    /// the operation started.
    #[error("operation queue closed before the operation ran")]
    Closed,

    /// The operation ran and failed. The original error is carried as-is.
    #[error(transparent)]
    Operation(E),
}

impl<E> QueueError<E> {
    /// `true` when the operation never ran (superseded, cleared, closed).
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        !matches!(self, Self::Operation(_))
    }

    /// The operation's own error, if it ran and failed.
    #[must_use]
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Cancelled | Self::Cleared | Self::Closed => None,
        }
    }
}

type Operation<T, E> = Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<T, E>>>;
type Outcome<T, E> = Result<T, QueueError<E>>;

/// An enqueued operation that has not started yet.
struct QueuedOperation<T, E> {
    id: u64,
    operation: Operation<T, E>,
    responder: oneshot::Sender<Outcome<T, E>>,
}

impl<T, E> QueuedOperation<T, E> {
    fn settle(self, outcome: Outcome<T, E>) {
        // The caller may have dropped its ticket; nobody is left to tell.
        let _ = self.responder.send(outcome);
    }
}

struct QueueState<T, E> {
    pending: VecDeque<QueuedOperation<T, E>>,
    /// Set while a drain task exists. Guards against a second one.
    processing: bool,
    next_id: u64,
}

impl<T, E> QueueState<T, E> {
    /// Settle and drop every pending operation. Returns how many there were.
    fn fail_pending(&mut self, reason: fn() -> QueueError<E>) -> usize {
        let count = self.pending.len();
        for op in self.pending.drain(..) {
            op.settle(Err(reason()));
        }
        count
    }
}

/// Serializes asynchronous operations against an exclusive resource.
///
/// See the [module docs](self) for the policy.
pub struct OperationQueue<T, E> {
    state: Rc<RefCell<QueueState<T, E>>>,
    spawner: Rc<dyn LocalSpawn>,
}

impl<T: 'static, E: 'static> OperationQueue<T, E> {
    /// Create an idle queue whose drain task runs on `spawner`.
    #[must_use]
    pub fn new(spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            state: Rc::new(RefCell::new(QueueState {
                pending: VecDeque::new(),
                processing: false,
                next_id: 0,
            })),
            spawner,
        }
    }

    /// Queue `operation` to run once the resource is free.
    ///
    /// Every operation still pending is settled with
    /// [`QueueError::Cancelled`] before this call returns. `operation`
    /// itself is not invoked until the drain task reaches it, so a burst
    /// of calls made without yielding runs only the last one.
    pub fn enqueue<F, Fut>(&self, operation: F) -> Ticket<T, E>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let start_drain = {
            let mut state = self.state.borrow_mut();
            let superseded = state.fail_pending(|| QueueError::Cancelled);
            let id = state.next_id;
            state.next_id += 1;
            if superseded > 0 {
                debug!(id, superseded, "newer operation superseded pending work");
            }
            state.pending.push_back(QueuedOperation {
                id,
                operation: Box::new(move || operation().boxed_local()),
                responder,
            });
            !std::mem::replace(&mut state.processing, true)
        };
        if start_drain {
            self.spawn_drain();
        }
        Ticket { receiver }
    }

    /// Settle every pending operation with [`QueueError::Cleared`].
    ///
    /// The in-flight operation, if any, still runs to completion.
    pub fn clear(&self) {
        let cleared = self
            .state
            .borrow_mut()
            .fail_pending(|| QueueError::Cleared);
        if cleared > 0 {
            debug!(cleared, "cleared pending operations");
        }
    }

    /// Whether an operation is running or about to run.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.state.borrow().processing
    }

    /// Number of operations waiting to start (excludes the in-flight one).
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.state.borrow().pending.len()
    }

    fn spawn_drain(&self) {
        if let Err(err) = self.spawner.spawn_local(drain(Rc::clone(&self.state))) {
            error!(%err, "failed to spawn operation queue drain task");
            let mut state = self.state.borrow_mut();
            state.processing = false;
            state.fail_pending(|| QueueError::Closed);
        }
    }
}

impl<T, E> Drop for OperationQueue<T, E> {
    fn drop(&mut self) {
        // The drain task keeps the state alive; stop it from starting
        // anything new. An in-flight operation still settles normally.
        self.state
            .borrow_mut()
            .fail_pending(|| QueueError::Closed);
    }
}

/// Run pending operations one at a time until none are left.
async fn drain<T, E>(state: Rc<RefCell<QueueState<T, E>>>) {
    loop {
        let next = {
            let mut state = state.borrow_mut();
            let next = state.pending.pop_front();
            if next.is_none() {
                state.processing = false;
            }
            next
        };
        let Some(QueuedOperation {
            id,
            operation,
            responder,
        }) = next
        else {
            return;
        };

        let started = Instant::now();
        let result = operation().await;
        debug!(
            id,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "operation finished"
        );
        let _ = responder.send(result.map_err(QueueError::Operation));
    }
}

/// The eventual outcome of an [`OperationQueue::enqueue`] call.
///
/// Resolves to the operation's result, or to a [`QueueError`] saying why
/// it did not run. Dropping a ticket does not cancel the operation.
#[must_use = "a ticket carries the operation's outcome"]
pub struct Ticket<T, E> {
    receiver: oneshot::Receiver<Outcome<T, E>>,
}

impl<T, E> Ticket<T, E> {
    /// Take the outcome if it has already settled, without waiting.
    ///
    /// Cancellation is visible here immediately after the superseding
    /// `enqueue` returns. The outcome can be taken once; afterwards the
    /// ticket reports [`QueueError::Closed`].
    pub fn try_outcome(&mut self) -> Option<Outcome<T, E>> {
        match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Some(Err(QueueError::Closed)),
        }
    }
}

impl<T, E> Future for Ticket<T, E> {
    type Output = Outcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|received| received.unwrap_or_else(|oneshot::Canceled| Err(QueueError::Closed)))
    }
}
