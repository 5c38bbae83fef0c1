//! In-memory signal bus.

use std::sync::{Arc, Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("signal bus lock poisoned")]
    Poisoned,
}

type Subscribers<M> = Arc<Mutex<Vec<(u64, mpsc::Sender<M>)>>>;

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - Subscriptions unregister themselves when dropped
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Subscribers<M>,
    next_id: Mutex<u64>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(0),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        let id = match self.next_id.lock() {
            Ok(mut next) => {
                *next += 1;
                *next
            }
            Err(_) => return Subscription::new(rx),
        };

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push((id, tx));
        }

        let registry = Arc::downgrade(&self.subscribers);
        Subscription::with_detach(rx, move || {
            if let Some(subs) = registry.upgrade() {
                if let Ok(mut subs) = subs.lock() {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_fans_out_to_every_subscriber() {
        let bus = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7u32).unwrap();

        assert_eq!(a.drain(), vec![7]);
        assert_eq!(b.drain(), vec![7]);
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(a);
        assert_eq!(bus.subscriber_count(), 1);

        b.detach();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_its_bus_detaches_quietly() {
        let bus = InMemoryEventBus::<u32>::new();
        let sub = bus.subscribe();
        drop(bus);

        assert!(sub.try_next().is_none());
        drop(sub);
    }
}
