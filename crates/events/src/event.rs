use serde::{Deserialize, Serialize};

use stowage_core::OwnerId;

/// A signal flowing over a bus.
///
/// Signals are:
/// - **immutable** (treat them as facts)
/// - **hints**, not values: a consumer re-reads the slot rather than trusting a payload
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable signal name (e.g. "container.slot.modified").
    fn event_type(&self) -> &'static str;
}

/// Signal emitted by a backing container, addressed by *local* slot index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerSignal {
    /// The slot's contents changed.
    SlotModified(usize),
    /// Something about the slot changed and should be re-checked (lighter than a modification).
    SlotNotified(usize),
    /// The container's slot count changed.
    Resized { count: usize },
    /// The container was closed by `by`.
    Closed { by: OwnerId },
}

impl Event for ContainerSignal {
    fn event_type(&self) -> &'static str {
        match self {
            ContainerSignal::SlotModified(_) => "container.slot.modified",
            ContainerSignal::SlotNotified(_) => "container.slot.notified",
            ContainerSignal::Resized { .. } => "container.resized",
            ContainerSignal::Closed { .. } => "container.closed",
        }
    }
}

/// Signal emitted by the aggregate, addressed by *global* slot index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateSignal {
    SlotModified(usize),
    SlotNotified(usize),
    /// Fired after any add/remove/reorder/refresh that changed the layout.
    MembershipChanged,
    /// Fired when the last partition is removed.
    Emptied,
}

impl Event for AggregateSignal {
    fn event_type(&self) -> &'static str {
        match self {
            AggregateSignal::SlotModified(_) => "aggregate.slot.modified",
            AggregateSignal::SlotNotified(_) => "aggregate.slot.notified",
            AggregateSignal::MembershipChanged => "aggregate.membership.changed",
            AggregateSignal::Emptied => "aggregate.emptied",
        }
    }
}
