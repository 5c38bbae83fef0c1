//! Signal publishing/subscription abstraction (mechanics only).
//!
//! Backing containers publish their slot and lifecycle signals on a bus; the aggregate
//! holds one subscription per container and drains it on its own event-processing thread.
//!
//! ## Scoped subscriptions
//!
//! A [`Subscription`] unregisters itself from its bus when dropped. Holding the
//! subscription *is* the registration, so there is no code path that can forget to
//! unsubscribe and leave a callback pointing into a container that has been reassigned.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

type DetachHook = Box<dyn FnOnce() + Send>;

/// A subscription to a signal stream.
///
/// Each subscription gets a copy of every message published after it was created.
///
/// ```ignore
/// let subscription = container.subscribe();
/// while let Some(signal) = subscription.try_next() {
///     relay(signal);
/// }
/// drop(subscription); // unregistered from the container's bus
/// ```
pub struct Subscription<M> {
    receiver: Receiver<M>,
    on_detach: Option<DetachHook>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            on_detach: None,
        }
    }

    /// Create a subscription that runs `on_detach` exactly once when it is dropped.
    pub fn with_detach(receiver: Receiver<M>, on_detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            receiver,
            on_detach: Some(Box::new(on_detach)),
        }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Next pending message, or `None` when nothing is queued (or the bus is gone).
    pub fn try_next(&self) -> Option<M> {
        self.receiver.try_recv().ok()
    }

    /// Drain every pending message.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }

    /// Explicitly unregister. Equivalent to dropping the subscription.
    pub fn detach(self) {}
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(hook) = self.on_detach.take() {
            hook();
        }
    }
}

impl<M> core::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("scoped", &self.on_detach.is_some())
            .finish()
    }
}

/// Transport-agnostic pub/sub abstraction.
///
/// Delivery is best-effort fan-out: a subscriber that was dropped simply stops receiving.
/// Consumers must tolerate duplicates (a slot signalled twice is re-read twice).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
