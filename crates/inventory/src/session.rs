//! The aggregate: several containers presented as one flat inventory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stowage_core::{ContainerId, InventoryError, InventoryResult, OwnerId};
use stowage_events::{AggregateSignal, CommandChannel, Event, EventBus, InMemoryEventBus, Subscription};

use crate::container::{BackingContainer, Slot};
use crate::ordering::StackOrder;
use crate::partition::{Partition, PartitionMeta, PartitionRef, PartitionTable};
use crate::relay::EventRelay;
use crate::router::SlotAddress;
use crate::slots::SlotSpace;
use crate::sort::{SortReport, sort_space};

/// What happens to a container leaving the aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// Detach and ask the authoritative side to close it.
    Close,
    /// Detach and hand it back to the caller, still open.
    Release,
}

/// A merged inventory session.
///
/// The session holds weak handles only: it addresses containers and requests mutations on
/// them, but their lifetime belongs to the caller. Container signals are queued and
/// forwarded by [`MergedInventory::pump_events`], translated to global indices.
pub struct MergedInventory {
    owner: OwnerId,
    table: PartitionTable,
    signals: InMemoryEventBus<AggregateSignal>,
    channel: Arc<dyn CommandChannel>,
}

impl MergedInventory {
    pub fn new(owner: OwnerId, channel: Arc<dyn CommandChannel>) -> Self {
        Self {
            owner,
            table: PartitionTable::new(),
            signals: InMemoryEventBus::new(),
            channel,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.table.total_count()
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.table.iter()
    }

    pub fn contains(&self, container: ContainerId) -> bool {
        self.table.contains(container)
    }

    pub fn subscribe(&self) -> Subscription<AggregateSignal> {
        self.signals.subscribe()
    }

    /// Add one container. Adding a container that is already aggregated is a no-op and
    /// returns `None`.
    pub fn add(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
    ) -> InventoryResult<Option<PartitionRef>> {
        let added = self.insert(container, meta)?;
        if added.is_some() {
            self.emit(AggregateSignal::MembershipChanged);
        }
        Ok(added)
    }

    /// Add several containers, announcing the new layout once.
    pub fn add_many<I>(&mut self, containers: I) -> InventoryResult<Vec<PartitionRef>>
    where
        I: IntoIterator<Item = (Arc<dyn BackingContainer>, PartitionMeta)>,
    {
        let mut added = Vec::new();
        for (container, meta) in containers {
            added.extend(self.insert(&container, meta)?);
        }
        if !added.is_empty() {
            self.emit(AggregateSignal::MembershipChanged);
        }
        Ok(added)
    }

    /// Add a container and send an open command for it.
    pub fn open(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
    ) -> InventoryResult<Option<PartitionRef>> {
        let added = self.add(container, meta)?;
        if let Some(partition) = &added {
            if let Err(err) = self.channel.send_open(partition.container) {
                tracing::warn!(container = %partition.container, "failed to send open command: {err}");
            }
        }
        Ok(added)
    }

    /// Remove the partition at `index`.
    ///
    /// With [`Removal::Release`] the container handle is returned so the caller can keep
    /// using it standalone; it is `None` when the container has already been dropped.
    pub fn remove(
        &mut self,
        index: usize,
        mode: Removal,
    ) -> InventoryResult<Option<Arc<dyn BackingContainer>>> {
        let partition = self.table.remove(index)?;
        let released = self.retire(partition, mode);
        self.after_removal();
        Ok(released)
    }

    /// Close the container if it is aggregated. Returns whether it was.
    pub fn remove_container(&mut self, container: ContainerId) -> InventoryResult<bool> {
        match self.table.find(container) {
            Some(index) => {
                self.remove(index, Removal::Close)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> InventoryResult<()> {
        self.table.reorder(from, to)?;
        if from != to {
            self.emit(AggregateSignal::MembershipChanged);
        }
        Ok(())
    }

    /// Re-read live container counts. Returns whether the layout changed.
    pub fn refresh_counts(&mut self) -> bool {
        let changed = self.table.refresh_counts();
        if changed {
            self.emit(AggregateSignal::MembershipChanged);
        }
        changed
    }

    pub fn locate(&self, global: usize) -> InventoryResult<SlotAddress> {
        self.table.locate(global)
    }

    pub fn global_index(&self, partition: usize, local: usize) -> InventoryResult<usize> {
        self.table.global_index(partition, local)
    }

    /// Global index of `local` inside `container`, if the container is aggregated.
    pub fn global_index_of(&self, container: ContainerId, local: usize) -> Option<usize> {
        let partition = self.table.find(container)?;
        self.table.global_index(partition, local).ok()
    }

    /// Start offset of every partition, for drawing separators.
    pub fn boundaries(&self) -> Vec<usize> {
        self.table.boundaries()
    }

    /// Drain container signals and forward them on the aggregate bus.
    ///
    /// Closures and resizes are applied to the table first, so forwarded indices always
    /// reflect the current layout. Returns the number of slot signals forwarded.
    pub fn pump_events(&mut self) -> usize {
        let was_empty = self.table.is_empty();
        let batch = EventRelay::collect(&self.table, self.owner);
        let mut layout_changed = false;

        for id in &batch.closed {
            if let Some(index) = self.table.find(*id) {
                if let Ok(partition) = self.table.remove(index) {
                    tracing::info!(container = %id, "container closed; partition removed");
                    partition.detach();
                    layout_changed = true;
                }
            }
        }
        if batch.needs_refresh {
            layout_changed |= self.table.refresh_counts();
        }

        let forwarded = EventRelay::translate(&self.table, &batch.slot_signals);
        let count = forwarded.len();
        for signal in forwarded {
            self.emit(signal);
        }

        if layout_changed {
            self.emit(AggregateSignal::MembershipChanged);
            if !was_empty && self.table.is_empty() {
                self.emit(AggregateSignal::Emptied);
            }
        }
        count
    }

    /// Sort the whole aggregate as one flat space.
    pub fn sort(&mut self, order: &dyn StackOrder, merge_after: bool) -> InventoryResult<SortReport> {
        self.pump_events();
        let report = sort_space(self, order, merge_after)?;
        self.pump_events();
        Ok(report)
    }

    /// Close every container and empty the session.
    pub fn close(&mut self) {
        let partitions = self.table.drain();
        if partitions.is_empty() {
            return;
        }
        tracing::info!(partitions = partitions.len(), "closing merged inventory");
        for partition in partitions {
            self.retire(partition, Removal::Close);
        }
        self.emit(AggregateSignal::MembershipChanged);
        self.emit(AggregateSignal::Emptied);
    }

    fn insert(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
    ) -> InventoryResult<Option<PartitionRef>> {
        match self.table.add(container, meta) {
            Ok(added) => Ok(Some(added)),
            Err(InventoryError::DuplicatePartition(id)) => {
                tracing::debug!(container = %id, "container already aggregated");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn retire(&self, partition: Partition, mode: Removal) -> Option<Arc<dyn BackingContainer>> {
        let id = partition.container_id();
        let handle = partition.upgrade();
        partition.detach();

        match mode {
            Removal::Close => {
                if let Err(err) = self.channel.send_close(id) {
                    tracing::warn!(container = %id, "failed to send close command: {err}");
                }
                None
            }
            Removal::Release => handle,
        }
    }

    fn after_removal(&self) {
        self.emit(AggregateSignal::MembershipChanged);
        if self.table.is_empty() {
            self.emit(AggregateSignal::Emptied);
        }
    }

    fn emit(&self, signal: AggregateSignal) {
        tracing::debug!(signal = signal.event_type(), "aggregate signal");
        if let Err(err) = self.signals.publish(signal) {
            tracing::warn!("failed to publish aggregate signal: {err}");
        }
    }
}

impl std::fmt::Debug for MergedInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedInventory")
            .field("owner", &self.owner)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SlotSpace for MergedInventory {
    fn slot_count(&self) -> usize {
        self.table.total_count()
    }

    fn stack_at(&self, index: usize) -> InventoryResult<Slot> {
        let (container, local) = self.table.resolve(index)?;
        container.slot_at(local)
    }

    fn transfer(&mut self, from: usize, to: usize, quantity: u32) -> InventoryResult<u32> {
        let (source, source_slot) = self.table.resolve(from)?;
        let (dest, dest_slot) = self.table.resolve(to)?;
        source.request_transfer(source_slot, dest.as_ref(), dest_slot, quantity)
    }

    fn flip(&mut self, a: usize, b: usize) -> InventoryResult<()> {
        let (first, first_slot) = self.table.resolve(a)?;
        let (second, second_slot) = self.table.resolve(b)?;
        first.request_flip(first_slot, second.as_ref(), second_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerKind, InMemoryContainer};
    use crate::item::{ItemKind, ItemStack};
    use crate::ordering::SortKey;
    use stowage_core::Entity;
    use stowage_events::{CommandAction, RecordingCommandChannel};

    struct Fixture {
        channel: Arc<RecordingCommandChannel>,
        session: MergedInventory,
    }

    fn fixture() -> Fixture {
        let channel = Arc::new(RecordingCommandChannel::new());
        let session = MergedInventory::new(OwnerId::new(), channel.clone());
        Fixture { channel, session }
    }

    fn chest(count: usize) -> Arc<InMemoryContainer> {
        Arc::new(InMemoryContainer::new(ContainerKind::Simple, count))
    }

    fn handle(chest: &Arc<InMemoryContainer>) -> Arc<dyn BackingContainer> {
        chest.clone()
    }

    fn stone(quantity: u32) -> Slot {
        Some(ItemStack::new(ItemKind::new("game:stone", "Stone"), quantity))
    }

    #[test]
    fn duplicate_add_is_a_silent_no_op() {
        let mut f = fixture();
        let a = chest(4);
        let signals = f.session.subscribe();

        assert!(f.session.add(&handle(&a), PartitionMeta::default()).unwrap().is_some());
        assert!(f.session.add(&handle(&a), PartitionMeta::default()).unwrap().is_none());

        assert_eq!(f.session.len(), 1);
        assert_eq!(signals.drain(), vec![AggregateSignal::MembershipChanged]);
    }

    #[test]
    fn add_many_announces_once() {
        let mut f = fixture();
        let (a, b) = (chest(2), chest(3));
        let signals = f.session.subscribe();

        let added = f
            .session
            .add_many([
                (handle(&a), PartitionMeta::titled("Chest")),
                (handle(&b), PartitionMeta::default()),
                (handle(&a), PartitionMeta::default()),
            ])
            .unwrap();

        assert_eq!(added.len(), 2);
        assert_eq!(f.session.boundaries(), vec![0, 2]);
        assert_eq!(signals.drain(), vec![AggregateSignal::MembershipChanged]);
    }

    #[test]
    fn reorder_announces_only_real_moves() {
        let mut f = fixture();
        let (a, b) = (chest(2), chest(3));
        f.session
            .add_many([(handle(&a), PartitionMeta::default()), (handle(&b), PartitionMeta::default())])
            .unwrap();
        let signals = f.session.subscribe();

        f.session.reorder(0, 1).unwrap();
        assert_eq!(f.session.boundaries(), vec![0, 3]);
        assert_eq!(signals.drain(), vec![AggregateSignal::MembershipChanged]);

        f.session.reorder(1, 1).unwrap();
        assert!(signals.drain().is_empty());

        assert!(f.session.reorder(0, 2).is_err());
        assert!(signals.drain().is_empty());
    }

    #[test]
    fn open_sends_a_command_only_for_new_containers() {
        let mut f = fixture();
        let a = chest(1);

        f.session.open(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.open(&handle(&a), PartitionMeta::default()).unwrap();

        assert_eq!(f.channel.actions_for(*a.id()), vec![CommandAction::Open]);
    }

    #[test]
    fn release_hands_the_container_back_without_closing_it() {
        let mut f = fixture();
        let a = chest(2);
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();

        let released = f.session.remove(0, Removal::Release).unwrap();

        assert_eq!(released.map(|c| *c.id()), Some(*a.id()));
        assert!(f.channel.actions_for(*a.id()).is_empty());
        assert_eq!(a.subscriber_count(), 0);
    }

    #[test]
    fn remove_container_closes_and_reports_presence() {
        let mut f = fixture();
        let (a, b) = (chest(2), chest(2));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        let signals = f.session.subscribe();

        assert!(!f.session.remove_container(*b.id()).unwrap());
        assert!(f.session.remove_container(*a.id()).unwrap());

        assert_eq!(f.channel.actions_for(*a.id()), vec![CommandAction::Close]);
        assert_eq!(
            signals.drain(),
            vec![AggregateSignal::MembershipChanged, AggregateSignal::Emptied]
        );
    }

    #[test]
    fn global_index_of_maps_container_slots() {
        let mut f = fixture();
        let (a, b) = (chest(4), chest(6));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();

        assert_eq!(f.session.global_index_of(*b.id(), 3), Some(7));
        assert_eq!(f.session.global_index_of(*b.id(), 6), None);
        assert_eq!(f.session.global_index_of(*chest(1).id(), 0), None);
    }

    #[test]
    fn reads_and_transfers_route_across_containers() {
        let mut f = fixture();
        let a = Arc::new(InMemoryContainer::with_slots(ContainerKind::Simple, vec![stone(3), None]));
        let b = chest(2);
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();

        f.session.transfer(0, 3, 3).unwrap();

        assert_eq!(f.session.stack_at(3).unwrap(), stone(3));
        assert_eq!(b.contents().unwrap(), vec![None, stone(3)]);
        assert!(f.session.stack_at(4).is_err());
    }

    #[test]
    fn pump_forwards_translated_signals() {
        let mut f = fixture();
        let (a, b) = (chest(4), chest(6));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();
        let signals = f.session.subscribe();

        b.set_slot(3, stone(1)).unwrap();

        assert_eq!(f.session.pump_events(), 1);
        assert_eq!(signals.drain(), vec![AggregateSignal::SlotModified(7)]);
    }

    #[test]
    fn closing_by_the_owner_removes_the_partition() {
        let mut f = fixture();
        let a = chest(2);
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        let signals = f.session.subscribe();

        a.close(f.session.owner());
        f.session.pump_events();

        assert!(f.session.is_empty());
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(
            signals.drain(),
            vec![AggregateSignal::MembershipChanged, AggregateSignal::Emptied]
        );
    }

    #[test]
    fn resize_shifts_later_partitions() {
        let mut f = fixture();
        let (a, b) = (chest(4), chest(2));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();

        a.resize(6).unwrap();
        f.session.pump_events();

        assert_eq!(f.session.boundaries(), vec![0, 6]);
        assert_eq!(f.session.total_count(), 8);
    }

    #[test]
    fn close_sends_close_for_every_partition() {
        let mut f = fixture();
        let (a, b) = (chest(1), chest(1));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();
        let signals = f.session.subscribe();

        f.session.close();

        assert!(f.session.is_empty());
        assert_eq!(f.channel.all().len(), 2);
        assert_eq!(
            signals.drain(),
            vec![AggregateSignal::MembershipChanged, AggregateSignal::Emptied]
        );
    }

    #[test]
    fn sort_spans_partitions() {
        let mut f = fixture();
        let a = Arc::new(InMemoryContainer::with_slots(ContainerKind::Simple, vec![None, stone(2)]));
        let b = Arc::new(InMemoryContainer::with_slots(ContainerKind::Simple, vec![stone(5)]));
        f.session.add(&handle(&a), PartitionMeta::default()).unwrap();
        f.session.add(&handle(&b), PartitionMeta::default()).unwrap();

        let report = f.session.sort(&SortKey::Name, true).unwrap();

        assert!(report.is_clean());
        assert_eq!(a.contents().unwrap(), vec![stone(7), None]);
        assert_eq!(b.contents().unwrap(), vec![None]);
    }
}
