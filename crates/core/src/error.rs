//! Error model shared by the aggregator and the sort engine.

use thiserror::Error;

use crate::id::{CommandId, ContainerId};

/// Result type used across the inventory layer.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Inventory-level error.
///
/// Only `InvariantViolation` indicates a bug in the engine itself; everything else is an
/// expected outcome the caller can react to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// A slot index was outside `[0, len)`.
    #[error("slot index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    /// The container is already part of the aggregate.
    #[error("container {0} is already aggregated")]
    DuplicatePartition(ContainerId),

    /// The authoritative side refused a move or flip.
    #[error("transfer rejected: {0}")]
    TransferRejected(String),

    /// A confirmation that was already handled inside the dedup window.
    #[error("stale command {0}")]
    StaleCommand(CommandId),

    /// A weakly held container has been dropped.
    #[error("container {0} is gone")]
    ContainerGone(ContainerId),

    /// Caller-supplied input could not be interpreted (an id, a sort key, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl InventoryError {
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::TransferRejected(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Whether a sort/merge pass may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransferRejected(_) | Self::ContainerGone(_))
    }
}
