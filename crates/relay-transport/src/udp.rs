//! Datagram sink: one UDP datagram per frame.

use std::net::UdpSocket;
use std::time::Duration;

use relay_feed::Frame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::destination::Destination;
use crate::error::TransportError;
use crate::sink::{SinkHandle, TransportSink};
use crate::{TransportResult, UDP_MAX_PAYLOAD};

/// UDP sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSinkConfig {
    /// Largest frame sent as a single datagram.
    pub max_payload: usize,

    /// Upper bound on a blocking send in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for UdpSinkConfig {
    fn default() -> Self {
        Self {
            max_payload: UDP_MAX_PAYLOAD,
            send_timeout_ms: 100,
        }
    }
}

/// Fire-and-forget UDP transport.
///
/// Frames above `max_payload` are rejected, never fragmented or truncated.
#[derive(Debug, Clone, Default)]
pub struct UdpSink {
    config: UdpSinkConfig,
}

impl UdpSink {
    /// Create a UDP sink.
    pub fn new(config: UdpSinkConfig) -> Self {
        Self { config }
    }

    /// Create a UDP sink with a specific payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self::new(UdpSinkConfig {
            max_payload,
            ..Default::default()
        })
    }
}

impl TransportSink for UdpSink {
    fn open(&self, destination: &Destination) -> TransportResult<Box<dyn SinkHandle>> {
        let socket =
            UdpSocket::bind(destination.local_wildcard()).map_err(TransportError::BindFailure)?;
        socket
            .connect(destination.addr())
            .map_err(TransportError::BindFailure)?;

        if self.config.send_timeout_ms > 0 {
            socket
                .set_write_timeout(Some(Duration::from_millis(self.config.send_timeout_ms)))
                .map_err(TransportError::BindFailure)?;
        }

        info!(
            local = ?socket.local_addr().ok(),
            %destination,
            max_payload = self.config.max_payload,
            "UDP sink open"
        );

        Ok(Box::new(UdpHandle {
            socket: Some(socket),
            destination: *destination,
            max_payload: self.config.max_payload,
        }))
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}

struct UdpHandle {
    socket: Option<UdpSocket>,
    destination: Destination,
    max_payload: usize,
}

impl SinkHandle for UdpHandle {
    fn send(&mut self, frame: Frame<'_>) -> TransportResult<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::ClosedHandle)?;

        if frame.len() > self.max_payload {
            return Err(TransportError::OversizedPayload {
                size: frame.len(),
                max: self.max_payload,
            });
        }

        let sent = socket
            .send(frame.as_bytes())
            .map_err(TransportError::SendFailure)?;

        trace!(sequence = frame.sequence(), bytes = sent, "Datagram sent");
        Ok(sent)
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(destination = %self.destination, "UDP sink closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}
