//! Signals, subscriptions and the open/close command boundary.

pub mod bus;
pub mod command;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::{
    ChannelError, CommandAction, CommandChannel, ContainerCommand, RecordingCommandChannel,
    TracingCommandChannel,
};
pub use event::{AggregateSignal, ContainerSignal, Event};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
