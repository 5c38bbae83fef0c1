//! `stowage-core`: shared building blocks for the inventory aggregator.
//!
//! This crate contains **pure** primitives (no containers, no signals, no IO).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{InventoryError, InventoryResult};
pub use id::{CommandId, ContainerId, OwnerId};
pub use value_object::ValueObject;
