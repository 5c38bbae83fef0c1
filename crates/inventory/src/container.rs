//! Backing containers: the storage the aggregate addresses but never owns.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, Entity, InventoryError, InventoryResult, OwnerId};
use stowage_events::{ContainerSignal, EventBus, InMemoryEventBus, Subscription};

use crate::item::ItemStack;

/// Contents of one slot.
pub type Slot = Option<ItemStack>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Plain chest-like container.
    Simple,
    /// Container whose layout depends on its type (columns, quantity).
    Typed,
    /// The player's own backpack.
    Backpack,
}

/// Capability set the aggregator needs from any container.
///
/// Transfers and flips are *requests*: the implementation is the authority and may refuse
/// with [`InventoryError::TransferRejected`]. Every successful mutation must be announced on
/// the container's signal bus so subscribers can re-read the affected slot.
pub trait BackingContainer: Entity<Id = ContainerId> + Send + Sync {
    fn kind(&self) -> ContainerKind;

    fn count(&self) -> usize;

    fn slot_at(&self, index: usize) -> InventoryResult<Slot>;

    /// Replace a slot's contents, returning the previous contents.
    fn set_slot(&self, index: usize, slot: Slot) -> InventoryResult<Slot>;

    fn subscribe(&self) -> Subscription<ContainerSignal>;

    /// Whether items may leave `index`.
    fn releases(&self, _index: usize) -> bool {
        true
    }

    /// Whether `stack` may be placed into `index`.
    fn accepts(&self, _index: usize, _stack: &ItemStack) -> bool {
        true
    }

    /// Move up to `quantity` items from `source` into `dest[dest_slot]`.
    ///
    /// Returns how many items actually moved. An empty destination takes up to a full
    /// stack; an occupied one only takes items it stacks with.
    fn request_transfer(
        &self,
        source: usize,
        dest: &dyn BackingContainer,
        dest_slot: usize,
        quantity: u32,
    ) -> InventoryResult<u32> {
        if self.id() == dest.id() && source == dest_slot {
            return Err(InventoryError::rejected("source and destination are the same slot"));
        }
        let Some(stack) = self.slot_at(source)? else {
            return Err(InventoryError::rejected(format!("slot {source} is empty")));
        };
        let target = dest.slot_at(dest_slot)?;

        let room = match &target {
            None => stack.max_stack(),
            Some(existing) => existing.room_for(&stack),
        };
        let moved = quantity.min(stack.quantity).min(room);
        if moved == 0 {
            return Err(InventoryError::rejected(format!(
                "slot {dest_slot} cannot take {}",
                stack.kind.code
            )));
        }
        if !self.releases(source) || !dest.accepts(dest_slot, &stack) {
            return Err(InventoryError::rejected("slot is locked"));
        }

        let placed = match target {
            None => stack.with_quantity(moved),
            Some(existing) => existing.with_quantity(existing.quantity + moved),
        };
        let remainder = (moved < stack.quantity).then(|| stack.with_quantity(stack.quantity - moved));

        self.set_slot(source, remainder)?;
        dest.set_slot(dest_slot, Some(placed))?;
        Ok(moved)
    }

    /// Exchange the contents of `source` and `dest[dest_slot]` atomically.
    fn request_flip(
        &self,
        source: usize,
        dest: &dyn BackingContainer,
        dest_slot: usize,
    ) -> InventoryResult<()> {
        if self.id() == dest.id() && source == dest_slot {
            return Err(InventoryError::rejected("cannot flip a slot with itself"));
        }
        let ours = self.slot_at(source)?;
        let theirs = dest.slot_at(dest_slot)?;

        if !self.releases(source) || !dest.releases(dest_slot) {
            return Err(InventoryError::rejected("slot is locked"));
        }
        let accepted = theirs.as_ref().is_none_or(|s| self.accepts(source, s))
            && ours.as_ref().is_none_or(|s| dest.accepts(dest_slot, s));
        if !accepted {
            return Err(InventoryError::rejected("flip refused by destination"));
        }

        self.set_slot(source, theirs)?;
        dest.set_slot(dest_slot, ours)?;
        Ok(())
    }
}

/// Reference container kept entirely in memory.
///
/// Slots can be locked to simulate an authority that refuses transfers.
#[derive(Debug)]
pub struct InMemoryContainer {
    id: ContainerId,
    kind: ContainerKind,
    slots: Mutex<Vec<Slot>>,
    locked: Mutex<BTreeSet<usize>>,
    signals: InMemoryEventBus<ContainerSignal>,
}

impl InMemoryContainer {
    /// Container with `count` empty slots.
    pub fn new(kind: ContainerKind, count: usize) -> Self {
        Self::with_slots(kind, vec![None; count])
    }

    pub fn with_slots(kind: ContainerKind, slots: Vec<Slot>) -> Self {
        Self {
            id: ContainerId::new(),
            kind,
            slots: Mutex::new(slots),
            locked: Mutex::new(BTreeSet::new()),
            signals: InMemoryEventBus::new(),
        }
    }

    /// Snapshot of every slot.
    pub fn contents(&self) -> InventoryResult<Vec<Slot>> {
        Ok(self.slots()?.clone())
    }

    /// Grow or shrink the container. Removed slots lose their contents.
    pub fn resize(&self, count: usize) -> InventoryResult<()> {
        self.slots()?.resize(count, None);
        self.publish(ContainerSignal::Resized { count });
        Ok(())
    }

    /// Ask subscribers to re-check a slot without changing it.
    pub fn notify(&self, index: usize) {
        self.publish(ContainerSignal::SlotNotified(index));
    }

    /// Announce that `by` closed this container.
    pub fn close(&self, by: OwnerId) {
        self.publish(ContainerSignal::Closed { by });
    }

    pub fn lock_slot(&self, index: usize) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.insert(index);
        }
    }

    pub fn unlock_slot(&self, index: usize) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.remove(&index);
        }
    }

    /// Number of live signal subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.signals.subscriber_count()
    }

    fn slots(&self) -> InventoryResult<MutexGuard<'_, Vec<Slot>>> {
        self.slots
            .lock()
            .map_err(|_| InventoryError::invariant("container lock poisoned"))
    }

    fn is_locked(&self, index: usize) -> bool {
        self.locked
            .lock()
            .map(|locked| locked.contains(&index))
            .unwrap_or(true)
    }

    fn publish(&self, signal: ContainerSignal) {
        if let Err(err) = self.signals.publish(signal) {
            tracing::warn!(container = %self.id, "failed to publish container signal: {err}");
        }
    }
}

impl Entity for InMemoryContainer {
    type Id = ContainerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl BackingContainer for InMemoryContainer {
    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn slot_at(&self, index: usize) -> InventoryResult<Slot> {
        let slots = self.slots()?;
        slots
            .get(index)
            .cloned()
            .ok_or_else(|| InventoryError::out_of_range(index, slots.len()))
    }

    fn set_slot(&self, index: usize, slot: Slot) -> InventoryResult<Slot> {
        let previous = {
            let mut slots = self.slots()?;
            let len = slots.len();
            let cell = slots
                .get_mut(index)
                .ok_or(InventoryError::out_of_range(index, len))?;
            std::mem::replace(cell, slot)
        };
        self.publish(ContainerSignal::SlotModified(index));
        Ok(previous)
    }

    fn subscribe(&self) -> Subscription<ContainerSignal> {
        self.signals.subscribe()
    }

    fn releases(&self, index: usize) -> bool {
        !self.is_locked(index)
    }

    fn accepts(&self, index: usize, _stack: &ItemStack) -> bool {
        !self.is_locked(index)
    }
}
