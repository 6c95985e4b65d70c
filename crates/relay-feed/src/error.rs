//! Error types for the feed module.

use thiserror::Error;

/// Errors that can occur while producing or subscribing to frames.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Valid length exceeds the buffer handed over by the producer.
    #[error("Frame length {len} exceeds buffer capacity {capacity}")]
    InvalidLength { len: usize, capacity: usize },

    /// Feed has been closed.
    #[error("Feed closed")]
    Closed,

    /// Producer already running.
    #[error("Feed already running")]
    AlreadyRunning,

    /// Producer not running.
    #[error("Feed not running")]
    NotRunning,

    /// Producer thread panicked.
    #[error("Feed thread panicked")]
    ThreadPanicked,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
