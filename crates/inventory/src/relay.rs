//! Re-emits container signals in the aggregate's flat address space.
//!
//! Each partition owns one [`RelayLink`]. The link is created when the partition is created
//! and unsubscribes when it is dropped, so subscription and detachment are always paired.
//!
//! Draining happens in two steps so that translation always sees current offsets:
//! [`EventRelay::collect`] gathers raw signals plus any structural changes (closures,
//! resizes, dropped handles), the session applies the structural changes to the table, and
//! only then [`EventRelay::translate`] maps local indices to global ones.

use std::collections::BTreeSet;

use stowage_core::{ContainerId, Entity, OwnerId};
use stowage_events::{AggregateSignal, ContainerSignal, Subscription};

use crate::container::BackingContainer;
use crate::partition::PartitionTable;
use crate::router::Span;

/// Scoped subscription from one partition to its container.
#[derive(Debug)]
pub struct RelayLink {
    container: ContainerId,
    subscription: Subscription<ContainerSignal>,
}

impl RelayLink {
    pub fn attach(container: &dyn BackingContainer) -> Self {
        let id = *container.id();
        tracing::debug!(container = %id, "relay attached");
        Self {
            container: id,
            subscription: container.subscribe(),
        }
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn detach(self) {
        tracing::debug!(container = %self.container, "relay detached");
        self.subscription.detach();
    }

    fn pending(&self) -> Vec<ContainerSignal> {
        self.subscription.drain()
    }
}

/// Slot-level signal still addressed by local index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocalSignal {
    Modified(usize),
    Notified(usize),
}

/// Everything drained from the links in one pass.
#[derive(Debug, Default)]
pub struct RelayBatch {
    pub slot_signals: Vec<(ContainerId, LocalSignal)>,
    /// Partitions to drop: closed by the session owner, or whose container is gone.
    pub closed: BTreeSet<ContainerId>,
    /// Some container's count changed; offsets must be refreshed.
    pub needs_refresh: bool,
}

impl RelayBatch {
    pub fn is_structural(&self) -> bool {
        !self.closed.is_empty() || self.needs_refresh
    }
}

pub struct EventRelay;

impl EventRelay {
    /// Drain every link.
    ///
    /// A cached count that disagrees with the container's live count also requests a refresh,
    /// which is how the optimistic view reconciles with the authoritative one.
    pub fn collect(table: &PartitionTable, owner: OwnerId) -> RelayBatch {
        let mut batch = RelayBatch::default();

        for partition in table.iter() {
            let id = partition.container_id();
            let Some(container) = partition.upgrade() else {
                tracing::debug!(container = %id, "container dropped; scheduling removal");
                batch.closed.insert(id);
                continue;
            };
            if container.count() != partition.count() {
                batch.needs_refresh = true;
            }

            for signal in partition.link().pending() {
                match signal {
                    ContainerSignal::SlotModified(local) => {
                        batch.slot_signals.push((id, LocalSignal::Modified(local)))
                    }
                    ContainerSignal::SlotNotified(local) => {
                        batch.slot_signals.push((id, LocalSignal::Notified(local)))
                    }
                    ContainerSignal::Resized { .. } => batch.needs_refresh = true,
                    ContainerSignal::Closed { by } if by == owner => {
                        batch.closed.insert(id);
                    }
                    ContainerSignal::Closed { by } => {
                        tracing::debug!(container = %id, closed_by = %by, "ignoring foreign close");
                    }
                }
            }
        }

        batch
    }

    /// Map local slot signals to global ones using the table's current offsets.
    ///
    /// Signals for partitions that no longer exist, or for slots beyond a shrunken
    /// partition, are dropped.
    pub fn translate(
        table: &PartitionTable,
        signals: &[(ContainerId, LocalSignal)],
    ) -> Vec<AggregateSignal> {
        signals
            .iter()
            .filter_map(|&(id, signal)| {
                let partition = table.get(table.find(id)?)?;
                let (local, wrap): (usize, fn(usize) -> AggregateSignal) = match signal {
                    LocalSignal::Modified(local) => (local, AggregateSignal::SlotModified),
                    LocalSignal::Notified(local) => (local, AggregateSignal::SlotNotified),
                };
                (local < partition.count()).then(|| wrap(partition.start() + local))
            })
            .collect()
    }
}
