//! Push-style video frame sources.
//!
//! A frame source hands each encoded frame to its registered listeners
//! on the producer's own thread. Listeners see a borrowed [`Frame`] that
//! is only valid for the duration of the call.

mod error;
mod feed;
mod file;
mod frame;

pub use error::FeedError;
pub use feed::{FrameListener, FrameSource, ListenerId, VideoFeed};
pub use file::{FileFeed, FileFeedConfig};
pub use frame::Frame;

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Default chunk size for file feeds: seven 188-byte MPEG-TS packets.
pub const DEFAULT_CHUNK_SIZE: usize = 7 * 188;

/// Default pause between file feed chunks in milliseconds.
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 5;
