//! Error types for the relay engine.

use relay_feed::FeedError;
use relay_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by `start`. Stopping never fails.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Another start is still in flight.
    #[error("Relay is already starting")]
    AlreadyStarting,

    /// The sink could not be opened or the stream was refused.
    #[error("Relay start failed: {0}")]
    StartFailed(#[source] TransportError),

    /// The frame source refused the subscription.
    #[error("Frame source subscription failed: {0}")]
    SubscribeFailed(#[from] FeedError),
}
