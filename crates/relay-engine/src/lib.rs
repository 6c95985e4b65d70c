//! Frame relay core for the video relay.
//!
//! [`FrameRelay`] forwards frames from a frame source to a transport sink
//! under a start/stop lifecycle; [`LiveStreamRelay`] wraps a live-stream
//! module with the same contract; [`StreamController`] serves front-end
//! commands over channels.

mod config;
mod controller;
mod error;
mod lifecycle;
mod live;
mod metrics;
mod relay;

pub use config::RelayConfig;
pub use controller::StreamController;
pub use error::RelayError;
pub use live::LiveStreamRelay;
pub use metrics::MetricsCollector;
pub use relay::FrameRelay;

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use relay_feed::FrameSource;
use relay_ipc::{RelayCommand, RelayEvent};

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Back-to-back send failures before a warning is raised.
pub const DEFAULT_FAILURE_ALARM_THRESHOLD: u64 = 50;

/// Interval between metrics events while active.
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 1000;

/// Create a controller instance with IPC channels.
pub fn create_controller(
    command_rx: Receiver<RelayCommand>,
    event_tx: Sender<RelayEvent>,
    source: Arc<dyn FrameSource>,
    config: RelayConfig,
) -> StreamController {
    StreamController::new(command_rx, event_tx, source, config)
}
