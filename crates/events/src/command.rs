use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stowage_core::{CommandId, ContainerId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandAction {
    Open,
    Close,
}

/// A request to open or close a container on the authoritative side.
///
/// Commands express **intent**. The authoritative peer answers with a confirmation carrying
/// the same `command_id`, which is what the deduplicator keys on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCommand {
    pub command_id: CommandId,
    pub container: ContainerId,
    pub action: CommandAction,
    pub issued_at: DateTime<Utc>,
}

impl ContainerCommand {
    pub fn new(container: ContainerId, action: CommandAction) -> Self {
        Self {
            command_id: CommandId::new(),
            container,
            action,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("command channel unavailable: {0}")]
    Unavailable(String),
}

/// Transport boundary for open/close commands.
///
/// Sending is fire-and-forget from the engine's point of view; the answer arrives later as a
/// confirmation.
pub trait CommandChannel: Send + Sync {
    fn send(&self, command: ContainerCommand) -> Result<(), ChannelError>;

    fn send_open(&self, container: ContainerId) -> Result<CommandId, ChannelError> {
        let command = ContainerCommand::new(container, CommandAction::Open);
        let id = command.command_id;
        self.send(command)?;
        Ok(id)
    }

    fn send_close(&self, container: ContainerId) -> Result<CommandId, ChannelError> {
        let command = ContainerCommand::new(container, CommandAction::Close);
        let id = command.command_id;
        self.send(command)?;
        Ok(id)
    }
}

/// Channel that keeps every command in memory (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingCommandChannel {
    inner: Mutex<Vec<ContainerCommand>>,
}

impl RecordingCommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ContainerCommand> {
        self.inner.lock().map(|cmds| cmds.clone()).unwrap_or_default()
    }

    /// Actions sent for one container, in order.
    pub fn actions_for(&self, container: ContainerId) -> Vec<CommandAction> {
        self.all()
            .into_iter()
            .filter(|c| c.container == container)
            .map(|c| c.action)
            .collect()
    }
}

impl CommandChannel for RecordingCommandChannel {
    fn send(&self, command: ContainerCommand) -> Result<(), ChannelError> {
        self.inner
            .lock()
            .map_err(|_| ChannelError::Unavailable("recording channel lock poisoned".into()))?
            .push(command);
        Ok(())
    }
}

/// Channel that only logs commands. Used when no transport is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCommandChannel;

impl CommandChannel for TracingCommandChannel {
    fn send(&self, command: ContainerCommand) -> Result<(), ChannelError> {
        tracing::info!(
            command_id = %command.command_id,
            container = %command.container,
            action = ?command.action,
            "container command"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_helpers_return_the_issued_id() {
        let channel = RecordingCommandChannel::new();
        let container = ContainerId::new();

        let open = channel.send_open(container).unwrap();
        let close = channel.send_close(container).unwrap();

        let sent = channel.all();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].command_id, open);
        assert_eq!(sent[1].command_id, close);
        assert_ne!(open, close);
        assert_eq!(
            channel.actions_for(container),
            vec![CommandAction::Open, CommandAction::Close]
        );
    }
}
