//! Folds compatible stacks together.
//!
//! Two cursors walk a visiting sequence: `i` is the slot being filled, `j > i` the slot being
//! drained. Slots strictly between them are always empty (they were drained). The walk is a
//! single left-to-right pass and never rescans backwards, so an incompatible stack between
//! two compatible ones keeps them apart.

use stowage_core::InventoryResult;

use crate::slots::{PassOutcome, SlotOp, SlotSpace};

pub struct MergePass;

impl MergePass {
    /// Merge along the natural order `0..slot_count`.
    pub fn run_linear<S>(space: &mut S) -> InventoryResult<PassOutcome>
    where
        S: SlotSpace + ?Sized,
    {
        let visit: Vec<usize> = (0..space.slot_count()).collect();
        Self::run(space, &visit)
    }

    /// Merge along `visit`, a sequence of distinct slot indices.
    pub fn run<S>(space: &mut S, visit: &[usize]) -> InventoryResult<PassOutcome>
    where
        S: SlotSpace + ?Sized,
    {
        let n = visit.len();
        let mut outcome = PassOutcome::default();
        let (mut i, mut j) = (0, 1);

        while i + 1 < n && j < n {
            let (to, from) = (visit[i], visit[j]);
            let target = space.stack_at(to)?;
            let source = space.stack_at(from)?;

            let mut drained = false;
            if let (Some(target), Some(source)) = (&target, &source) {
                if target.can_take_from(source) {
                    let quantity = target.room_for(source).min(source.quantity);
                    let op = SlotOp::Merge { from, to, quantity };
                    let moved = outcome.record(op, space.transfer(from, to, quantity))?;
                    drained = moved.is_some_and(|moved| moved >= source.quantity);
                }
            }

            if drained {
                j += 1;
            } else {
                i += 1;
                if j <= i {
                    j = i + 1;
                }
            }
        }

        if !outcome.applied.is_empty() {
            tracing::debug!(
                merged = outcome.applied.len(),
                rejected = outcome.rejected.len(),
                "merge pass finished"
            );
        }
        Ok(outcome)
    }
}
