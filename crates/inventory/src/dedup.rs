//! Suppression of duplicate open/close confirmations.
//!
//! The authoritative side may deliver the same confirmation more than once in quick
//! succession. A confirmation is a duplicate when it carries the last accepted command id and
//! arrives within the window (inclusive) of it.

use chrono::{DateTime, Duration, Utc};

use stowage_core::{CommandId, InventoryError, InventoryResult};

pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 10;

/// The last accepted confirmation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub last_timestamp: DateTime<Utc>,
    pub last_id: CommandId,
}

/// Per-channel deduplicator.
#[derive(Debug, Clone)]
pub struct PacketDeduplicator {
    window: Duration,
    last: Option<PendingCommand>,
}

impl PacketDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last(&self) -> Option<&PendingCommand> {
        self.last.as_ref()
    }

    /// Accept a confirmation, or reject it as [`InventoryError::StaleCommand`].
    pub fn admit(&mut self, at: DateTime<Utc>, id: CommandId) -> InventoryResult<()> {
        if let Some(last) = &self.last {
            let gap = if at >= last.last_timestamp {
                at - last.last_timestamp
            } else {
                last.last_timestamp - at
            };
            if last.last_id == id && gap <= self.window {
                tracing::debug!(command = %id, gap_ms = gap.num_milliseconds(), "duplicate confirmation");
                return Err(InventoryError::StaleCommand(id));
            }
        }

        self.last = Some(PendingCommand {
            last_timestamp: at,
            last_id: id,
        });
        Ok(())
    }

    /// Forget the accepted confirmation after the action it triggered failed, so a retry
    /// carrying the same id is not mistaken for a duplicate.
    pub fn release(&mut self) {
        self.last = None;
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for PacketDeduplicator {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_DEDUP_WINDOW_MS))
    }
}
