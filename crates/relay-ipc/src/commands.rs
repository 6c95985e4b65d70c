//! Commands sent from the front end to the engine.

use serde::{Deserialize, Serialize};

use crate::types::StreamTarget;

/// Commands that a front end can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayCommand {
    /// Start relaying frames to the given target.
    Start { target: StreamTarget },

    /// Stop the active relay.
    Stop,

    /// The video device went away; equivalent to `Stop`.
    DeviceDisconnected,

    /// Request the current relay state.
    GetState,

    /// Request a metrics snapshot.
    GetMetrics,

    /// Stop everything and end the command loop.
    Shutdown,
}
