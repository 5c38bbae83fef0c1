//! Partitioned inventory aggregation and in-place sorting.
//!
//! Several independent containers are presented as one flat, addressable inventory
//! ([`MergedInventory`]), and any flat slot space can be reordered and compacted by the sort
//! engine ([`sort_space`]) with a near-minimal number of move/flip/merge requests.
//!
//! This crate holds no storage of its own: containers own their slots, and every mutation
//! is a request the container may refuse.

pub mod config;
pub mod container;
pub mod dedup;
pub mod executor;
pub mod item;
pub mod merge;
pub mod ordering;
pub mod organizer;
pub mod partition;
pub mod relay;
pub mod router;
pub mod session;
pub mod slots;
pub mod solver;
pub mod sort;

pub use config::OrganizerConfig;
pub use container::{BackingContainer, ContainerKind, InMemoryContainer, Slot};
pub use dedup::{PacketDeduplicator, PendingCommand};
pub use executor::MoveExecutor;
pub use item::{Attributes, ItemClass, ItemKind, ItemStack};
pub use merge::MergePass;
pub use ordering::{SortKey, StackOrder, compare_slots};
pub use organizer::{Confirmation, ConfirmationOutcome, Organizer};
pub use partition::{Partition, PartitionMeta, PartitionRef, PartitionTable};
pub use relay::{EventRelay, RelayLink};
pub use router::{SlotAddress, SlotRouter, Span};
pub use session::{MergedInventory, Removal};
pub use slots::{ContainerSpace, PassOutcome, RejectedOp, SlotOp, SlotSpace};
pub use solver::PermutationSolver;
pub use sort::{SortReport, sort_space};
