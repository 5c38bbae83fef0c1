//! Ordered partition table backing the aggregate's flat address space.
//!
//! ## Offset invariant
//!
//! - `partitions[0].start == 0`
//! - `partitions[i].start == partitions[i - 1].end()`
//! - `sum(count) == total_count`
//! - no container appears twice
//!
//! Every structural change (add, remove, reorder, count refresh) ends by recomputing offsets
//! in one left-to-right pass and asserting the invariant in debug builds. The router's
//! binary search depends on it.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, Entity, InventoryError, InventoryResult};

use crate::container::{BackingContainer, ContainerKind};
use crate::relay::RelayLink;
use crate::router::{SlotAddress, SlotRouter, Span};

pub const DEFAULT_COLUMNS: u16 = 4;

/// Display metadata carried alongside a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub title: Option<String>,
    pub columns: u16,
}

impl PartitionMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_columns(mut self, columns: u16) -> Self {
        self.columns = columns;
        self
    }
}

impl Default for PartitionMeta {
    fn default() -> Self {
        Self {
            title: None,
            columns: DEFAULT_COLUMNS,
        }
    }
}

/// One container's contiguous range in the aggregate.
#[derive(Debug)]
pub struct Partition {
    container: Weak<dyn BackingContainer>,
    id: ContainerId,
    kind: ContainerKind,
    start: usize,
    count: usize,
    meta: PartitionMeta,
    link: RelayLink,
}

impl Partition {
    fn new(container: &Arc<dyn BackingContainer>, start: usize, meta: PartitionMeta) -> Self {
        Self {
            container: Arc::downgrade(container),
            id: *container.id(),
            kind: container.kind(),
            start,
            count: container.count(),
            meta,
            link: RelayLink::attach(container.as_ref()),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn meta(&self) -> &PartitionMeta {
        &self.meta
    }

    /// Strong handle to the container, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn BackingContainer>> {
        self.container.upgrade()
    }

    pub fn link(&self) -> &RelayLink {
        &self.link
    }

    /// Unsubscribe from the container. Consumes the partition.
    pub fn detach(self) {
        self.link.detach();
    }
}

impl Span for Partition {
    fn start(&self) -> usize {
        self.start
    }

    fn count(&self) -> usize {
        self.count
    }
}

/// Handle returned by [`PartitionTable::add`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRef {
    pub index: usize,
    pub container: ContainerId,
}

/// Partitions in display (insertion) order.
#[derive(Debug, Default)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
    total: usize,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Number of addressable slots across all partitions.
    pub fn total_count(&self) -> usize {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    pub fn find(&self, container: ContainerId) -> Option<usize> {
        self.partitions.iter().position(|p| p.id == container)
    }

    pub fn contains(&self, container: ContainerId) -> bool {
        self.find(container).is_some()
    }

    /// Start offset of every partition.
    pub fn boundaries(&self) -> Vec<usize> {
        self.partitions.iter().map(|p| p.start).collect()
    }

    /// Append a container at the end of the address space.
    ///
    /// Adding a container that is already present changes nothing and reports
    /// [`InventoryError::DuplicatePartition`].
    pub fn add(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
    ) -> InventoryResult<PartitionRef> {
        let id = *container.id();
        if self.contains(id) {
            return Err(InventoryError::DuplicatePartition(id));
        }

        let partition = Partition::new(container, self.total, meta);
        tracing::debug!(
            container = %id,
            start = partition.start,
            count = partition.count,
            "partition added"
        );
        self.partitions.push(partition);
        self.recompute_offsets();

        Ok(PartitionRef {
            index: self.partitions.len() - 1,
            container: id,
        })
    }

    /// Remove a partition and close the gap it leaves.
    ///
    /// The returned partition still holds its relay link; dropping it (or calling
    /// [`Partition::detach`]) unsubscribes.
    pub fn remove(&mut self, index: usize) -> InventoryResult<Partition> {
        if index >= self.partitions.len() {
            return Err(InventoryError::out_of_range(index, self.partitions.len()));
        }
        let removed = self.partitions.remove(index);
        tracing::debug!(container = %removed.id, index, "partition removed");
        self.recompute_offsets();
        Ok(removed)
    }

    /// Move the partition at `from` so it ends up at `to`, shifting the ones in between.
    pub fn reorder(&mut self, from: usize, to: usize) -> InventoryResult<()> {
        let len = self.partitions.len();
        for index in [from, to] {
            if index >= len {
                return Err(InventoryError::out_of_range(index, len));
            }
        }
        if from == to {
            return Ok(());
        }

        if from < to {
            self.partitions[from..=to].rotate_left(1);
        } else {
            self.partitions[to..=from].rotate_right(1);
        }
        tracing::debug!(from, to, "partition reordered");
        self.recompute_offsets();
        Ok(())
    }

    /// Re-read every container's live count. Returns whether any count changed.
    ///
    /// A container whose handle is gone contributes no slots until it is removed.
    pub fn refresh_counts(&mut self) -> bool {
        let mut changed = false;
        for partition in &mut self.partitions {
            let live = partition.container.upgrade().map_or(0, |c| c.count());
            if live != partition.count {
                tracing::debug!(
                    container = %partition.id,
                    from = partition.count,
                    to = live,
                    "partition resized"
                );
                partition.count = live;
                changed = true;
            }
        }
        self.recompute_offsets();
        changed
    }

    pub fn locate(&self, global: usize) -> InventoryResult<SlotAddress> {
        SlotRouter::locate(&self.partitions, self.total, global)
    }

    pub fn global_index(&self, partition: usize, local: usize) -> InventoryResult<usize> {
        SlotRouter::global_index(&self.partitions, partition, local)
    }

    /// The container and local index behind a global slot.
    pub fn resolve(&self, global: usize) -> InventoryResult<(Arc<dyn BackingContainer>, usize)> {
        let address = self.locate(global)?;
        let partition = &self.partitions[address.partition];
        let container = partition
            .upgrade()
            .ok_or(InventoryError::ContainerGone(partition.id))?;
        Ok((container, address.local))
    }

    /// Take every partition out of the table, leaving it empty.
    pub fn drain(&mut self) -> Vec<Partition> {
        let drained = std::mem::take(&mut self.partitions);
        self.recompute_offsets();
        drained
    }

    /// Verify the offset invariant.
    pub fn check_invariant(&self) -> InventoryResult<()> {
        let mut expected = 0;
        let mut seen = BTreeSet::new();
        for (i, partition) in self.partitions.iter().enumerate() {
            if partition.start != expected {
                return Err(InventoryError::invariant(format!(
                    "partition {i} starts at {} but should start at {expected}",
                    partition.start
                )));
            }
            if !seen.insert(partition.id) {
                return Err(InventoryError::invariant(format!(
                    "container {} appears twice",
                    partition.id
                )));
            }
            expected += partition.count;
        }
        if expected != self.total {
            return Err(InventoryError::invariant(format!(
                "total count {} does not match partition sum {expected}",
                self.total
            )));
        }
        Ok(())
    }

    fn recompute_offsets(&mut self) {
        let mut start = 0;
        for partition in &mut self.partitions {
            partition.start = start;
            start += partition.count;
        }
        self.total = start;

        debug_assert!(
            self.check_invariant().is_ok(),
            "partition offsets out of sync: {:?}",
            self.check_invariant()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::InMemoryContainer;
    use proptest::prelude::*;

    fn containers(counts: &[usize]) -> Vec<Arc<dyn BackingContainer>> {
        counts
            .iter()
            .map(|&count| {
                Arc::new(InMemoryContainer::new(ContainerKind::Simple, count))
                    as Arc<dyn BackingContainer>
            })
            .collect()
    }

    fn table_of(handles: &[Arc<dyn BackingContainer>]) -> PartitionTable {
        let mut table = PartitionTable::new();
        for handle in handles {
            table.add(handle, PartitionMeta::default()).unwrap();
        }
        table
    }

    fn layout(table: &PartitionTable) -> Vec<(ContainerId, usize, usize)> {
        table
            .iter()
            .map(|p| (p.container_id(), p.start(), p.count()))
            .collect()
    }

    #[test]
    fn add_lays_partitions_out_contiguously() {
        let handles = containers(&[4, 6, 2]);
        let table = table_of(&handles);

        assert_eq!(table.boundaries(), vec![0, 4, 10]);
        assert_eq!(table.total_count(), 12);
        assert_eq!(
            table.locate(7).unwrap(),
            SlotAddress { partition: 1, local: 3 }
        );
    }

    #[test]
    fn add_is_idempotent_per_container() {
        let handles = containers(&[4]);
        let mut table = table_of(&handles);

        let err = table.add(&handles[0], PartitionMeta::default()).unwrap_err();

        assert_eq!(err, InventoryError::DuplicatePartition(*handles[0].id()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total_count(), 4);
    }

    #[test]
    fn removing_the_middle_partition_closes_the_gap() {
        let handles = containers(&[4, 6, 2]);
        let mut table = table_of(&handles);

        let removed = table.remove(1).unwrap();

        assert_eq!(removed.container_id(), *handles[1].id());
        assert_eq!(
            layout(&table),
            vec![(*handles[0].id(), 0, 4), (*handles[2].id(), 4, 2)]
        );
        assert_eq!(table.total_count(), 6);
    }

    #[test]
    fn removed_partition_detaches_from_its_container() {
        let chest = Arc::new(InMemoryContainer::new(ContainerKind::Typed, 3));
        let handle: Arc<dyn BackingContainer> = chest.clone();
        let mut table = table_of(&[handle]);
        assert_eq!(chest.subscriber_count(), 1);

        table.remove(0).unwrap().detach();
        assert_eq!(chest.subscriber_count(), 0);
    }

    #[test]
    fn reorder_rotates_only_the_affected_range() {
        let handles = containers(&[1, 2, 3, 4]);
        let ids: Vec<_> = handles.iter().map(|h| *h.id()).collect();
        let mut table = table_of(&handles);

        table.reorder(0, 2).unwrap();
        assert_eq!(
            layout(&table),
            vec![(ids[1], 0, 2), (ids[2], 2, 3), (ids[0], 5, 1), (ids[3], 6, 4)]
        );

        table.reorder(3, 0).unwrap();
        assert_eq!(
            layout(&table),
            vec![(ids[3], 0, 4), (ids[1], 4, 2), (ids[2], 6, 3), (ids[0], 9, 1)]
        );

        table.reorder(1, 1).unwrap();
        assert_eq!(table.boundaries(), vec![0, 4, 6, 9]);
        assert!(table.reorder(0, 4).is_err());
    }

    #[test]
    fn refresh_picks_up_live_counts() {
        let chest = Arc::new(InMemoryContainer::new(ContainerKind::Simple, 4));
        let other = containers(&[2]);
        let handle: Arc<dyn BackingContainer> = chest.clone();
        let mut table = table_of(&[handle, other[0].clone()]);

        chest.resize(1).unwrap();
        assert!(table.refresh_counts());
        assert_eq!(table.boundaries(), vec![0, 1]);
        assert_eq!(table.total_count(), 3);
        assert!(!table.refresh_counts());
    }

    #[test]
    fn resolve_reports_dropped_containers() {
        let mut table = PartitionTable::new();
        let id = {
            let handle = containers(&[2]).remove(0);
            table.add(&handle, PartitionMeta::default()).unwrap();
            *handle.id()
        };

        assert_eq!(
            table.resolve(0).err(),
            Some(InventoryError::ContainerGone(id))
        );
    }

    #[derive(Debug, Clone)]
    enum TableOp {
        Add(usize),
        Remove(usize),
        Reorder(usize, usize),
    }

    fn table_op() -> impl Strategy<Value = TableOp> {
        prop_oneof![
            (0usize..9).prop_map(TableOp::Add),
            (0usize..8).prop_map(TableOp::Remove),
            (0usize..8, 0usize..8).prop_map(|(a, b)| TableOp::Reorder(a, b)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the offset invariant holds after every add/remove/reorder.
        #[test]
        fn offsets_stay_contiguous(ops in prop::collection::vec(table_op(), 1..40)) {
            let mut table = PartitionTable::new();
            let mut alive: Vec<Arc<dyn BackingContainer>> = Vec::new();

            for op in ops {
                match op {
                    TableOp::Add(count) => {
                        let handle = containers(&[count]).remove(0);
                        table.add(&handle, PartitionMeta::default()).unwrap();
                        alive.push(handle);
                    }
                    TableOp::Remove(i) => {
                        if i < table.len() {
                            table.remove(i).unwrap();
                        } else {
                            prop_assert!(table.remove(i).is_err());
                        }
                    }
                    TableOp::Reorder(from, to) => {
                        let in_range = from < table.len() && to < table.len();
                        prop_assert_eq!(table.reorder(from, to).is_ok(), in_range);
                    }
                }

                prop_assert!(table.check_invariant().is_ok());
                prop_assert_eq!(table.boundaries().first().copied().unwrap_or(0), 0);
                let sum: usize = table.iter().map(|p| p.count()).sum();
                prop_assert_eq!(sum, table.total_count());
            }
        }
    }
}
