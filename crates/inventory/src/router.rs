//! Global ⇄ (partition, local) index translation.

use serde::{Deserialize, Serialize};

use stowage_core::{InventoryError, InventoryResult};

/// A contiguous range in the flat address space.
pub trait Span {
    fn start(&self) -> usize;
    fn count(&self) -> usize;

    fn end(&self) -> usize {
        self.start() + self.count()
    }
}

/// Where a global slot lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotAddress {
    pub partition: usize,
    pub local: usize,
}

/// Stateless router over an ordered, contiguous offset table.
pub struct SlotRouter;

impl SlotRouter {
    /// Find the partition holding `global`.
    ///
    /// Binary search over `start`; O(log P). Empty spans share their start with the next
    /// span and are never returned.
    pub fn locate<S: Span>(spans: &[S], total: usize, global: usize) -> InventoryResult<SlotAddress> {
        if global >= total {
            return Err(InventoryError::out_of_range(global, total));
        }
        let after = spans.partition_point(|span| span.start() <= global);
        let partition = after
            .checked_sub(1)
            .ok_or_else(|| InventoryError::invariant("first partition does not start at 0"))?;
        let span = &spans[partition];
        debug_assert!(global < span.end(), "offset table has a gap at {global}");

        Ok(SlotAddress {
            partition,
            local: global - span.start(),
        })
    }

    /// Inverse of [`SlotRouter::locate`]. O(1).
    pub fn global_index<S: Span>(spans: &[S], partition: usize, local: usize) -> InventoryResult<usize> {
        let span = spans
            .get(partition)
            .ok_or_else(|| InventoryError::out_of_range(partition, spans.len()))?;
        if local >= span.count() {
            return Err(InventoryError::out_of_range(local, span.count()));
        }
        Ok(span.start() + local)
    }
}
