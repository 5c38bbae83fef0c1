//! Target ordering for a set of slots.

use crate::container::Slot;
use crate::ordering::{StackOrder, compare_slots};

pub struct PermutationSolver;

impl PermutationSolver {
    /// Stable sort of `0..slots.len()` by `order`, absent slots last.
    ///
    /// `result[i]` is the index of the slot whose contents belong at position `i`.
    pub fn solve(slots: &[Slot], order: &dyn StackOrder) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..slots.len()).collect();
        indices.sort_by(|&a, &b| compare_slots(order, &slots[a], &slots[b]));
        indices
    }
}
