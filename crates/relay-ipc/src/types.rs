//! Common types used across relay messages.

use serde::{Deserialize, Serialize};

/// Where relayed frames go, as entered by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamTarget {
    /// One datagram per frame.
    Udp { host: String, port: u16 },

    /// Frames written to a TCP connection.
    Tcp { host: String, port: u16 },

    /// RTMP live stream (e.g., "rtmp://host/app/key").
    Rtmp { url: String },
}

impl StreamTarget {
    /// Returns true if this target goes through the live-stream module
    /// rather than the frame relay.
    pub fn is_live_stream(&self) -> bool {
        matches!(self, Self::Rtmp { .. })
    }

    /// Short protocol name.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Udp { .. } => "udp",
            Self::Tcp { .. } => "tcp",
            Self::Rtmp { .. } => "rtmp",
        }
    }
}

impl std::fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp { host, port } | Self::Tcp { host, port } => {
                write!(f, "{}://{}:{}", self.scheme(), host, port)
            }
            Self::Rtmp { url } => f.write_str(url),
        }
    }
}

/// Relay counters at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayMetrics {
    /// Frames per second forwarded since the last report.
    pub fps: f32,

    /// Average outbound bitrate in kbps since start.
    pub bitrate_kbps: u32,

    /// Frames handed to the sink successfully.
    pub frames_forwarded: u64,

    /// Payload bytes handed to the sink successfully.
    pub bytes_sent: u64,

    /// Sends that failed (oversized frames included).
    pub send_failures: u64,

    /// Frames rejected for exceeding the sink's payload limit.
    pub oversized_frames: u64,

    /// Frames dropped because the relay was not active.
    pub inactive_drops: u64,

    /// Current run of back-to-back send failures.
    pub consecutive_failures: u64,

    /// Seconds since the relay became active.
    pub uptime_seconds: u64,
}

/// Conditions worth surfacing to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayWarning {
    /// Sends keep failing back to back; the destination is likely
    /// unreachable.
    SendFailures { consecutive: u64 },
}

impl RelayWarning {
    /// Get a display message for this warning.
    pub fn message(&self) -> String {
        match self {
            Self::SendFailures { consecutive } => {
                format!("{} consecutive send failures", consecutive)
            }
        }
    }
}
