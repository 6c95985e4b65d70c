//! Borrowed video frame type.

use bytes::Bytes;

use crate::error::FeedError;
use crate::FeedResult;

/// One encoded video frame as handed to a listener.
///
/// The frame borrows the producer's buffer, which may be reused as soon
/// as the listener returns. Use [`Frame::to_bytes`] to keep a copy.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    sequence: u64,
}

impl<'a> Frame<'a> {
    /// Create a frame over the first `len` bytes of `buffer`.
    pub fn new(buffer: &'a [u8], len: usize, sequence: u64) -> FeedResult<Self> {
        if len > buffer.len() {
            return Err(FeedError::InvalidLength {
                len,
                capacity: buffer.len(),
            });
        }

        Ok(Self {
            data: &buffer[..len],
            sequence,
        })
    }

    /// Create a frame covering all of `data`.
    pub fn from_slice(data: &'a [u8], sequence: u64) -> Self {
        Self { data, sequence }
    }

    /// The valid payload.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Valid payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Monotonically increasing sequence number assigned by the feed.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Copy the payload into an owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.data)
    }
}
