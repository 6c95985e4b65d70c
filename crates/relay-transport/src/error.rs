//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Local socket could not be allocated.
    #[error("Failed to bind local socket: {0}")]
    BindFailure(#[source] std::io::Error),

    /// Frame is larger than the transport can carry in one unit.
    #[error("Payload of {size} bytes exceeds maximum of {max} bytes")]
    OversizedPayload { size: usize, max: usize },

    /// Transmission of one frame failed.
    #[error("Send failed: {0}")]
    SendFailure(#[source] std::io::Error),

    /// Handle was already closed.
    #[error("Sink handle is closed")]
    ClosedHandle,

    /// Could not reach the destination.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Destination could not be parsed or resolved.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Live-stream module refused to start.
    #[error("Live stream rejected with result code {0}")]
    StreamRejected(i32),

    /// RTMP protocol error.
    #[error("RTMP protocol error: {0}")]
    Protocol(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
