//! Sort orchestration over any [`SlotSpace`].

use serde::{Deserialize, Serialize};

use stowage_core::InventoryResult;

use crate::executor::MoveExecutor;
use crate::merge::MergePass;
use crate::ordering::StackOrder;
use crate::slots::{PassOutcome, RejectedOp, SlotOp, SlotSpace};
use crate::solver::PermutationSolver;

/// Everything one sort issued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortReport {
    /// Relocations (moves and flips) that were accepted.
    pub moves: Vec<SlotOp>,
    /// Merges that were accepted.
    pub merges: Vec<SlotOp>,
    pub rejected: Vec<RejectedOp>,
}

impl SortReport {
    /// Number of accepted operations.
    pub fn operation_count(&self) -> usize {
        self.moves.len() + self.merges.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    fn absorb_merges(&mut self, pass: PassOutcome) {
        self.merges.extend(pass.applied);
        self.rejected.extend(pass.rejected);
    }
}

/// Sort `space` by `order`.
///
/// With `merge_after`, same-kind stacks are first gathered along the solved order, so they
/// are folded together before anything is relocated, and a final linear merge pass runs
/// after relocation.
pub fn sort_space<S>(space: &mut S, order: &dyn StackOrder, merge_after: bool) -> InventoryResult<SortReport>
where
    S: SlotSpace + ?Sized,
{
    let mut report = SortReport::default();

    if merge_after {
        let snapshot = space.snapshot()?;
        let visit = PermutationSolver::solve(&snapshot, order);
        report.absorb_merges(MergePass::run(space, &visit)?);
    }

    let snapshot = space.snapshot()?;
    let permutation = PermutationSolver::solve(&snapshot, order);
    let relocation = MoveExecutor::apply(space, &snapshot, &permutation)?;
    report.moves = relocation.applied;
    report.rejected.extend(relocation.rejected);

    if merge_after {
        report.absorb_merges(MergePass::run_linear(space)?);
    }

    tracing::info!(
        slots = snapshot.len(),
        moves = report.moves.len(),
        merges = report.merges.len(),
        rejected = report.rejected.len(),
        "sort finished"
    );
    Ok(report)
}
