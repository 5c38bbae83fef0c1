//! Caller-owned host for the merged inventory session.
//!
//! Holds at most one [`MergedInventory`] and the deduplicator for its command channel.
//! Authoritative open/close confirmations enter through [`Organizer::on_confirmation`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::{CommandId, ContainerId, Entity, InventoryError, InventoryResult, OwnerId};
use stowage_events::CommandChannel;

use crate::config::OrganizerConfig;
use crate::container::BackingContainer;
use crate::dedup::PacketDeduplicator;
use crate::partition::{PartitionMeta, PartitionRef};
use crate::session::{MergedInventory, Removal};
use crate::sort::SortReport;

/// What the authoritative side confirmed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Open,
    Close,
    /// Close if already aggregated, open otherwise.
    Toggle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Opened,
    Closed,
    /// A duplicate of a confirmation handled moments ago.
    AlreadyHandled,
    /// Nothing to do: no session, or the container was already in the requested state.
    Ignored,
}

pub struct Organizer {
    config: OrganizerConfig,
    owner: OwnerId,
    channel: Arc<dyn CommandChannel>,
    session: Option<MergedInventory>,
    dedup: PacketDeduplicator,
}

impl Organizer {
    pub fn new(config: OrganizerConfig, owner: OwnerId, channel: Arc<dyn CommandChannel>) -> Self {
        let dedup = PacketDeduplicator::new(config.dedup_window);
        Self {
            config,
            owner,
            channel,
            session: None,
            dedup,
        }
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn session(&self) -> Option<&MergedInventory> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut MergedInventory> {
        self.session.as_mut()
    }

    /// The active session, starting one if needed.
    ///
    /// A newly started session begins with a fresh deduplicator.
    pub fn start_session(&mut self) -> &mut MergedInventory {
        if self.session.is_none() {
            self.dedup.reset();
        }
        self.ensure_session()
    }

    /// Add containers to the session, starting it if needed.
    pub fn merge<I>(&mut self, containers: I) -> InventoryResult<Vec<PartitionRef>>
    where
        I: IntoIterator<Item = (Arc<dyn BackingContainer>, PartitionMeta)>,
    {
        self.start_session().add_many(containers)
    }

    /// Handle an authoritative confirmation for `container`.
    ///
    /// Duplicates are filtered before anything else, so an echo can neither reopen a
    /// container its original just closed nor start a session of its own. With no active
    /// session, an opening confirmation starts one only when `start_session` is set. A
    /// confirmation whose action then fails releases the deduplicator so the retry is not
    /// swallowed.
    pub fn on_confirmation(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
        confirmation: Confirmation,
        command_id: CommandId,
        at: DateTime<Utc>,
        start_session: bool,
    ) -> InventoryResult<ConfirmationOutcome> {
        let id = *container.id();
        match self.dedup.admit(at, command_id) {
            Ok(()) => {}
            Err(InventoryError::StaleCommand(_)) => {
                tracing::debug!(container = %id, ?confirmation, "duplicate confirmation dropped");
                return Ok(ConfirmationOutcome::AlreadyHandled);
            }
            Err(err) => return Err(err),
        }

        let aggregated = self.session.as_ref().is_some_and(|s| s.contains(id));
        let opening = match confirmation {
            Confirmation::Open => true,
            Confirmation::Close => false,
            Confirmation::Toggle => !aggregated,
        };

        if self.session.is_none() && !(opening && start_session) {
            tracing::debug!(container = %id, ?confirmation, "no session; confirmation ignored");
            return Ok(ConfirmationOutcome::Ignored);
        }

        let applied = if opening {
            self.apply_open(container, meta)
        } else {
            self.apply_close(id)
        };
        if applied.is_err() {
            self.dedup.release();
        }
        applied
    }

    /// Close every container and drop the session.
    pub fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            tracing::info!(owner = %self.owner, "merged inventory session ended");
        }
        self.dedup.reset();
    }

    /// Forward pending container signals. A session left empty is dropped.
    pub fn pump_events(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let forwarded = session.pump_events();
        self.drop_if_empty();
        forwarded
    }

    /// Sort the active session with the configured key and merge setting.
    pub fn sort_session(&mut self) -> InventoryResult<Option<SortReport>> {
        let (key, merge) = (self.config.sort_key, self.config.merge_after_sort);
        match self.session.as_mut() {
            Some(session) => session.sort(&key, merge).map(Some),
            None => Ok(None),
        }
    }

    fn apply_open(
        &mut self,
        container: &Arc<dyn BackingContainer>,
        meta: PartitionMeta,
    ) -> InventoryResult<ConfirmationOutcome> {
        if container.count() == 0 {
            return Err(InventoryError::invalid_input(format!(
                "container {} has no slots to aggregate",
                container.id()
            )));
        }
        let added = self.ensure_session().add(container, meta)?;
        Ok(match added {
            Some(_) => ConfirmationOutcome::Opened,
            None => ConfirmationOutcome::Ignored,
        })
    }

    fn apply_close(&mut self, id: ContainerId) -> InventoryResult<ConfirmationOutcome> {
        let Some(session) = self.session.as_mut() else {
            return Ok(ConfirmationOutcome::Ignored);
        };
        let Some(index) = session.partitions().position(|p| p.container_id() == id) else {
            return Ok(ConfirmationOutcome::Ignored);
        };
        // Already closed on the authoritative side; only detach.
        session.remove(index, Removal::Release)?;
        self.drop_if_empty();
        Ok(ConfirmationOutcome::Closed)
    }

    /// The active session, starting one without touching the deduplicator.
    fn ensure_session(&mut self) -> &mut MergedInventory {
        self.session.get_or_insert_with(|| {
            tracing::info!(owner = %self.owner, "merged inventory session started");
            MergedInventory::new(self.owner, self.channel.clone())
        })
    }

    fn drop_if_empty(&mut self) {
        if self.session.as_ref().is_some_and(MergedInventory::is_empty) {
            tracing::info!(owner = %self.owner, "merged inventory session emptied");
            self.session = None;
        }
    }
}

impl std::fmt::Debug for Organizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Organizer")
            .field("config", &self.config)
            .field("owner", &self.owner)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stowage_events::{AggregateSignal, CommandAction, RecordingCommandChannel};

    use crate::container::{ContainerKind, InMemoryContainer};

    fn organizer() -> (Organizer, Arc<RecordingCommandChannel>) {
        let channel = Arc::new(RecordingCommandChannel::new());
        let organizer = Organizer::new(OrganizerConfig::default(), OwnerId::new(), channel.clone());
        (organizer, channel)
    }

    fn chest() -> Arc<dyn BackingContainer> {
        Arc::new(InMemoryContainer::new(ContainerKind::Simple, 4))
    }

    fn t0() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn open_without_session_needs_permission() {
        let (mut organizer, _) = organizer();
        let a = chest();

        let outcome = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Open, CommandId::new(), t0(), false)
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Ignored);
        assert!(organizer.session().is_none());

        let outcome = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Open, CommandId::new(), t0(), true)
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Opened);
        assert_eq!(organizer.session().map(MergedInventory::len), Some(1));
    }

    #[test]
    fn duplicate_toggle_is_applied_once() {
        let (mut organizer, _) = organizer();
        let a = chest();
        let id = CommandId::new();
        let at = t0();

        let first = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Toggle, id, at, true)
            .unwrap();
        let echo = organizer
            .on_confirmation(
                &a,
                PartitionMeta::default(),
                Confirmation::Toggle,
                id,
                at + Duration::milliseconds(3),
                true,
            )
            .unwrap();

        assert_eq!(first, ConfirmationOutcome::Opened);
        assert_eq!(echo, ConfirmationOutcome::AlreadyHandled);
        assert!(organizer.session().is_some_and(|s| s.contains(*a.id())));
    }

    #[test]
    fn toggle_closes_an_aggregated_container_and_empties_the_session() {
        let (mut organizer, channel) = organizer();
        let a = chest();
        organizer.merge([(a.clone(), PartitionMeta::default())]).unwrap();
        let signals = organizer.session().map(MergedInventory::subscribe).unwrap();

        let outcome = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Toggle, CommandId::new(), t0(), false)
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Closed);
        assert!(organizer.session().is_none());
        assert!(channel.actions_for(*a.id()).is_empty());
        assert_eq!(
            signals.drain(),
            vec![AggregateSignal::MembershipChanged, AggregateSignal::Emptied]
        );
    }

    #[test]
    fn echoed_toggle_does_not_reopen_a_closed_container() {
        let (mut organizer, channel) = organizer();
        let a = chest();
        organizer.merge([(a.clone(), PartitionMeta::default())]).unwrap();
        let id = CommandId::new();
        let at = t0();

        let first = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Toggle, id, at, true)
            .unwrap();
        let echo = organizer
            .on_confirmation(
                &a,
                PartitionMeta::default(),
                Confirmation::Toggle,
                id,
                at + Duration::milliseconds(3),
                true,
            )
            .unwrap();

        assert_eq!(first, ConfirmationOutcome::Closed);
        assert_eq!(echo, ConfirmationOutcome::AlreadyHandled);
        assert!(organizer.session().is_none());
        assert!(channel.actions_for(*a.id()).is_empty());
    }

    #[test]
    fn close_echo_after_the_session_emptied_is_already_handled() {
        let (mut organizer, _) = organizer();
        let a = chest();
        organizer.merge([(a.clone(), PartitionMeta::default())]).unwrap();
        let id = CommandId::new();
        let at = t0();

        let first = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Close, id, at, false)
            .unwrap();
        assert_eq!(first, ConfirmationOutcome::Closed);
        assert!(organizer.session().is_none());

        let echo = organizer
            .on_confirmation(
                &a,
                PartitionMeta::default(),
                Confirmation::Close,
                id,
                at + Duration::milliseconds(5),
                false,
            )
            .unwrap();
        assert_eq!(echo, ConfirmationOutcome::AlreadyHandled);
    }

    #[test]
    fn failed_open_lets_its_retry_through() {
        let (mut organizer, _) = organizer();
        let raw = Arc::new(InMemoryContainer::new(ContainerKind::Simple, 0));
        let a: Arc<dyn BackingContainer> = raw.clone();
        let id = CommandId::new();
        let at = t0();

        let err = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Open, id, at, true)
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
        assert!(organizer.session().is_none());

        raw.resize(4).unwrap();
        let retry = organizer
            .on_confirmation(
                &a,
                PartitionMeta::default(),
                Confirmation::Open,
                id,
                at + Duration::milliseconds(2),
                true,
            )
            .unwrap();

        assert_eq!(retry, ConfirmationOutcome::Opened);
        assert!(organizer.session().is_some_and(|s| s.contains(*a.id())));
    }

    #[test]
    fn starting_a_session_forgets_earlier_commands() {
        let (mut organizer, _) = organizer();
        let a = chest();
        let id = CommandId::new();
        let at = t0();

        let ignored = organizer
            .on_confirmation(&a, PartitionMeta::default(), Confirmation::Open, id, at, false)
            .unwrap();
        assert_eq!(ignored, ConfirmationOutcome::Ignored);

        organizer.start_session();
        let outcome = organizer
            .on_confirmation(
                &a,
                PartitionMeta::default(),
                Confirmation::Open,
                id,
                at + Duration::milliseconds(1),
                false,
            )
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Opened);
    }

    #[test]
    fn end_session_closes_everything() {
        let (mut organizer, channel) = organizer();
        let (a, b) = (chest(), chest());
        organizer
            .merge([(a.clone(), PartitionMeta::default()), (b.clone(), PartitionMeta::default())])
            .unwrap();

        organizer.end_session();

        assert!(organizer.session().is_none());
        assert_eq!(channel.actions_for(*a.id()), vec![CommandAction::Close]);
        assert_eq!(channel.actions_for(*b.id()), vec![CommandAction::Close]);
    }

    #[test]
    fn sort_without_session_is_none() {
        let (mut organizer, _) = organizer();
        assert_eq!(organizer.sort_session().unwrap(), None);
    }
}
