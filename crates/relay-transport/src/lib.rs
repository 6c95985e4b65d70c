//! Network sinks for relayed video frames.
//!
//! This crate provides the transports a relay forwards frames through:
//! datagram (UDP) and stream (TCP) sinks behind the [`TransportSink`]
//! trait, and an RTMP live-stream module behind [`LiveStreamModule`].

mod destination;
mod error;
mod live;
mod nal;
mod rtmp;
mod sink;
mod tcp;
mod udp;

pub use destination::Destination;
pub use error::TransportError;
pub use live::{describe_result_code, result_code, LiveStreamModule};
pub use nal::{FlvVideoPacketizer, FlvVideoTag};
pub use rtmp::{RtmpConfig, RtmpEndpoint, RtmpLiveStream, TransportStatistics};
pub use sink::{SinkHandle, TransportSink};
pub use tcp::{StreamFraming, TcpSink, TcpSinkConfig};
pub use udp::{UdpSink, UdpSinkConfig};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
pub const UDP_MAX_PAYLOAD: usize = 65_507;

/// Channel capacity for outgoing RTMP packets.
pub const PACKET_CHANNEL_CAPACITY: usize = 30;

/// Default RTMP port.
pub const DEFAULT_RTMP_PORT: u16 = 1935;
