//! Listener registry and the frame source trait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::FeedError;
use crate::frame::Frame;
use crate::FeedResult;

/// Callback invoked once per delivered frame.
pub type FrameListener = Arc<dyn Fn(Frame<'_>) + Send + Sync>;

/// Token returned by [`FrameSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A push producer of video frames.
pub trait FrameSource: Send + Sync {
    /// Register a listener. Frames delivered after this returns reach it.
    fn subscribe(&self, listener: FrameListener) -> FeedResult<ListenerId>;

    /// Remove a listener. Once this returns, the listener is not running
    /// and will not be invoked again. Returns false for unknown ids.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

struct Registry {
    listeners: Vec<(ListenerId, FrameListener)>,
    closed: bool,
}

/// In-process frame source that fans each delivered buffer out to its
/// listeners on the caller's thread.
///
/// Listeners run while the registry read lock is held, so they must not
/// subscribe or unsubscribe from inside the callback.
pub struct VideoFeed {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl VideoFeed {
    /// Create an open feed with no listeners.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                listeners: Vec::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    /// Deliver the first `len` bytes of `buffer` to every listener.
    ///
    /// Returns the number of listeners that saw the frame. The buffer may
    /// be reused by the caller as soon as this returns.
    pub fn deliver(&self, buffer: &[u8], len: usize) -> FeedResult<usize> {
        let registry = self.registry.read();
        if registry.closed {
            return Err(FeedError::Closed);
        }

        if len > buffer.len() {
            return Err(FeedError::InvalidLength {
                len,
                capacity: buffer.len(),
            });
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::from_slice(&buffer[..len], sequence);

        trace!(sequence, len, listeners = registry.listeners.len(), "Delivering frame");

        for (_, listener) in registry.listeners.iter() {
            listener(frame);
        }

        Ok(registry.listeners.len())
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.read().listeners.len()
    }

    /// Number of frames delivered so far.
    pub fn frames_delivered(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Detach all listeners and refuse further subscriptions and frames.
    pub fn close(&self) {
        let mut registry = self.registry.write();
        registry.closed = true;
        let dropped = registry.listeners.len();
        registry.listeners.clear();
        debug!(dropped, "Feed closed");
    }

    /// Returns true once [`VideoFeed::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.registry.read().closed
    }
}

impl Default for VideoFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for VideoFeed {
    fn subscribe(&self, listener: FrameListener) -> FeedResult<ListenerId> {
        let mut registry = self.registry.write();
        if registry.closed {
            return Err(FeedError::Closed);
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        registry.listeners.push((id, listener));
        debug!(?id, "Listener subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.write();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        let removed = registry.listeners.len() != before;
        if removed {
            debug!(?id, "Listener unsubscribed");
        }
        removed
    }
}
