//! Relay state machine type.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a relay.
///
/// Frames are forwarded only while `Active`; anything arriving in another
/// state is dropped on the spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    /// Not relaying, no sink open.
    #[default]
    Idle,

    /// Opening the sink and subscribing to the frame source.
    Starting,

    /// Subscribed and forwarding frames.
    Active,

    /// Unsubscribing and closing the sink.
    Stopping,
}

impl RelayState {
    /// Returns true if the relay is idle.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if a start is in flight.
    pub fn is_starting(self) -> bool {
        matches!(self, Self::Starting)
    }

    /// Returns true if frames are being forwarded.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if a stop is in flight.
    pub fn is_stopping(self) -> bool {
        matches!(self, Self::Stopping)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
        }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
