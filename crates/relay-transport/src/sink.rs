//! Sink traits.

use relay_feed::Frame;

use crate::destination::Destination;
use crate::TransportResult;

/// An open outbound channel to one destination.
///
/// Handles are not safe for concurrent writes; callers serialize `send`.
pub trait SinkHandle: Send {
    /// Transmit one frame. Returns the payload bytes handed to the network.
    fn send(&mut self, frame: Frame<'_>) -> TransportResult<usize>;

    /// Release the channel. Closing twice is a no-op.
    fn close(&mut self);

    /// Returns true once the handle has been closed.
    fn is_closed(&self) -> bool;
}

/// Opens sink handles.
pub trait TransportSink: Send + Sync {
    /// Allocate a channel to `destination`.
    fn open(&self, destination: &Destination) -> TransportResult<Box<dyn SinkHandle>>;

    /// Short protocol name for logs and status lines.
    fn name(&self) -> &'static str;
}
