//! Typed control and status messages for the frame relay.
//!
//! This crate defines the messages exchanged between a controlling
//! front end (CLI, UI) and the relay engine, plus the relay state type
//! shared by both sides.

mod commands;
mod events;
mod state;
mod types;

pub use commands::RelayCommand;
pub use events::RelayEvent;
pub use state::RelayState;
pub use types::{RelayMetrics, RelayWarning, StreamTarget};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (front end → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → front end).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<RelayCommand>, Receiver<RelayCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<RelayEvent>, Receiver<RelayEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
