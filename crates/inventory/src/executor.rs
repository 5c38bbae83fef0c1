//! Applies a solved permutation to live storage.
//!
//! Works in cycle-following fashion: position `i` is settled by one request that brings the
//! stack destined for it out of wherever the bookkeeping says it currently sits. Every
//! position except the last needs at most one request, so a pass over `N` slots issues at
//! most `N - 1` of them.
//!
//! Bookkeeping is optimistic. A refused request is recorded and the pass carries on as if
//! it had succeeded; the relay reconciles the view afterwards.

use stowage_core::{InventoryError, InventoryResult};

use crate::container::Slot;
use crate::slots::{PassOutcome, SlotOp, SlotSpace};

pub struct MoveExecutor;

impl MoveExecutor {
    /// Rearrange `space` so that position `i` holds what `contents[order[i]]` held.
    ///
    /// `contents` is the snapshot `order` was solved against.
    pub fn apply<S>(space: &mut S, contents: &[Slot], order: &[usize]) -> InventoryResult<PassOutcome>
    where
        S: SlotSpace + ?Sized,
    {
        let n = contents.len();
        if order.len() != n {
            return Err(InventoryError::invariant(format!(
                "permutation has {} entries for {n} slots",
                order.len()
            )));
        }

        // current[slot] = origin of the stack held there; location[origin] = its slot.
        let mut current: Vec<usize> = (0..n).collect();
        let mut location: Vec<usize> = (0..n).collect();
        let mut outcome = PassOutcome::default();

        for (i, &origin) in order.iter().enumerate() {
            let k = *location.get(origin).ok_or_else(|| InventoryError::out_of_range(origin, n))?;
            if k == i {
                continue;
            }

            let at_target = &contents[current[i]];
            let at_source = &contents[current[k]];
            match (at_target, at_source) {
                (None, Some(stack)) => {
                    let op = SlotOp::Move { from: k, to: i, quantity: stack.quantity };
                    outcome.record(op, space.transfer(k, i, stack.quantity))?;
                }
                (Some(stack), None) => {
                    let op = SlotOp::Move { from: i, to: k, quantity: stack.quantity };
                    outcome.record(op, space.transfer(i, k, stack.quantity))?;
                }
                (Some(_), Some(_)) => {
                    let op = SlotOp::Flip { a: k, b: i };
                    outcome.record(op, space.flip(k, i))?;
                }
                (None, None) => {}
            }

            current.swap(i, k);
            location[current[i]] = i;
            location[current[k]] = k;
        }

        tracing::debug!(
            slots = n,
            applied = outcome.applied.len(),
            rejected = outcome.rejected.len(),
            "permutation applied"
        );
        Ok(outcome)
    }
}
