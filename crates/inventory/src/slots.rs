//! Flat, addressable slot spaces.
//!
//! The sort engine never talks to containers directly; it runs against a [`SlotSpace`].
//! Both the aggregate and a single container implement it, so the same solver, executor
//! and merge pass work on either.

use serde::{Deserialize, Serialize};

use stowage_core::InventoryResult;

use crate::container::{BackingContainer, Slot};

/// A contiguous range of addressable slots `0..slot_count()`.
pub trait SlotSpace {
    fn slot_count(&self) -> usize;

    fn stack_at(&self, index: usize) -> InventoryResult<Slot>;

    /// Request moving up to `quantity` items from `from` onto `to`. Returns the amount moved.
    fn transfer(&mut self, from: usize, to: usize, quantity: u32) -> InventoryResult<u32>;

    /// Request exchanging the contents of `a` and `b`.
    fn flip(&mut self, a: usize, b: usize) -> InventoryResult<()>;

    fn snapshot(&self) -> InventoryResult<Vec<Slot>> {
        (0..self.slot_count()).map(|i| self.stack_at(i)).collect()
    }
}

/// One mutating request issued by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SlotOp {
    /// Relocate a whole stack into an empty slot.
    Move { from: usize, to: usize, quantity: u32 },
    /// Exchange two occupied slots.
    Flip { a: usize, b: usize },
    /// Fold (part of) a stack onto a compatible one.
    Merge { from: usize, to: usize, quantity: u32 },
}

/// A request the authoritative side refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOp {
    pub op: SlotOp,
    pub reason: String,
}

/// Operations one engine pass issued, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub applied: Vec<SlotOp>,
    pub rejected: Vec<RejectedOp>,
}

impl PassOutcome {
    /// Record the result of issuing `op`.
    ///
    /// Recoverable refusals are kept and the pass goes on; anything else aborts it.
    pub fn record<T>(&mut self, op: SlotOp, result: InventoryResult<T>) -> InventoryResult<Option<T>> {
        match result {
            Ok(value) => {
                self.applied.push(op);
                Ok(Some(value))
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!(?op, "request rejected: {err}");
                self.rejected.push(RejectedOp {
                    op,
                    reason: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn issued(&self) -> usize {
        self.applied.len() + self.rejected.len()
    }
}

/// A single container viewed as a slot space.
pub struct ContainerSpace<'a> {
    container: &'a dyn BackingContainer,
}

impl<'a> ContainerSpace<'a> {
    pub fn new(container: &'a dyn BackingContainer) -> Self {
        Self { container }
    }
}

impl SlotSpace for ContainerSpace<'_> {
    fn slot_count(&self) -> usize {
        self.container.count()
    }

    fn stack_at(&self, index: usize) -> InventoryResult<Slot> {
        self.container.slot_at(index)
    }

    fn transfer(&mut self, from: usize, to: usize, quantity: u32) -> InventoryResult<u32> {
        self.container.request_transfer(from, self.container, to, quantity)
    }

    fn flip(&mut self, a: usize, b: usize) -> InventoryResult<()> {
        self.container.request_flip(a, self.container, b)
    }
}
