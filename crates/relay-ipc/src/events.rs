//! Events sent from the engine to the front end.

use serde::{Deserialize, Serialize};

use crate::state::RelayState;
use crate::types::{RelayMetrics, RelayWarning};

/// Events that the engine can send to the front end.
///
/// Every event renders to a human-readable status line through
/// [`RelayEvent::status_message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayEvent {
    /// Relay state has changed.
    StateChanged {
        /// Previous state.
        previous: RelayState,

        /// Current state.
        current: RelayState,

        /// What the transition was about (destination, cause).
        detail: String,
    },

    /// A frame could not be sent; the stream continues.
    SendFailed {
        /// Sequence number of the lost frame.
        sequence: u64,

        /// Valid length of the lost frame.
        size: usize,

        /// Error message.
        message: String,
    },

    /// Updated relay metrics.
    Metrics(RelayMetrics),

    /// Operator-visible warning.
    Warning(RelayWarning),

    /// A command failed.
    Error {
        /// Error message.
        message: String,
    },

    /// Engine is ready for commands.
    Ready,

    /// Engine has shut down.
    Shutdown,
}

impl RelayEvent {
    /// Get a display line for this event.
    pub fn status_message(&self) -> String {
        match self {
            Self::StateChanged {
                previous,
                current,
                detail,
            } => {
                if detail.is_empty() {
                    format!("{} -> {}", previous, current)
                } else {
                    format!("{} -> {}: {}", previous, current, detail)
                }
            }
            Self::SendFailed {
                sequence,
                size,
                message,
            } => format!("Frame #{} ({} bytes) not sent: {}", sequence, size, message),
            Self::Metrics(m) => format!(
                "{:.1} fps, {} kbps, {} sent, {} failed",
                m.fps, m.bitrate_kbps, m.frames_forwarded, m.send_failures
            ),
            Self::Warning(warning) => format!("Warning: {}", warning.message()),
            Self::Error { message } => format!("Error: {}", message),
            Self::Ready => "Ready".to_string(),
            Self::Shutdown => "Shut down".to_string(),
        }
    }
}
