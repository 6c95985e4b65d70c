//! Stream sink: frames written to one TCP connection.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use relay_feed::Frame;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::destination::Destination;
use crate::error::TransportError;
use crate::sink::{SinkHandle, TransportSink};
use crate::TransportResult;

/// How frames are delimited on the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFraming {
    /// Frames written back to back.
    Raw,

    /// Each frame preceded by its length as a 4-byte big-endian integer.
    #[default]
    LengthPrefixed,
}

/// TCP sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSinkConfig {
    /// Connect deadline in milliseconds.
    pub connect_timeout_ms: u64,

    /// Upper bound on a blocking write in milliseconds.
    pub send_timeout_ms: u64,

    /// Frame delimiting.
    pub framing: StreamFraming,
}

impl Default for TcpSinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
            send_timeout_ms: 1000,
            framing: StreamFraming::default(),
        }
    }
}

/// Reliable stream transport.
#[derive(Debug, Clone, Default)]
pub struct TcpSink {
    config: TcpSinkConfig,
}

impl TcpSink {
    /// Create a TCP sink.
    pub fn new(config: TcpSinkConfig) -> Self {
        Self { config }
    }
}

impl TransportSink for TcpSink {
    fn open(&self, destination: &Destination) -> TransportResult<Box<dyn SinkHandle>> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms.max(1));
        let stream = TcpStream::connect_timeout(&destination.addr(), timeout).map_err(|e| {
            TransportError::ConnectionFailed(format!("TCP connect to {} failed: {}", destination, e))
        })?;

        stream.set_nodelay(true).map_err(TransportError::BindFailure)?;
        if self.config.send_timeout_ms > 0 {
            stream
                .set_write_timeout(Some(Duration::from_millis(self.config.send_timeout_ms)))
                .map_err(TransportError::BindFailure)?;
        }

        info!(%destination, framing = ?self.config.framing, "TCP sink open");

        Ok(Box::new(TcpHandle {
            stream: Some(stream),
            destination: *destination,
            framing: self.config.framing,
            scratch: BytesMut::new(),
            broken: false,
        }))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

struct TcpHandle {
    stream: Option<TcpStream>,
    destination: Destination,
    framing: StreamFraming,
    scratch: BytesMut,
    broken: bool,
}

impl SinkHandle for TcpHandle {
    fn send(&mut self, frame: Frame<'_>) -> TransportResult<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::ClosedHandle)?;

        if self.broken {
            return Err(TransportError::SendFailure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection broken by an earlier write",
            )));
        }

        let result = match self.framing {
            StreamFraming::Raw => stream.write_all(frame.as_bytes()),
            StreamFraming::LengthPrefixed => {
                let len = u32::try_from(frame.len()).map_err(|_| TransportError::OversizedPayload {
                    size: frame.len(),
                    max: u32::MAX as usize,
                })?;
                self.scratch.clear();
                self.scratch.reserve(4 + frame.len());
                self.scratch.put_u32(len);
                self.scratch.put_slice(frame.as_bytes());
                stream.write_all(&self.scratch)
            }
        };

        match result {
            Ok(()) => {
                trace!(sequence = frame.sequence(), bytes = frame.len(), "Frame written");
                Ok(frame.len())
            }
            Err(e) => {
                warn!(destination = %self.destination, "TCP write failed, connection marked broken: {}", e);
                self.broken = true;
                Err(TransportError::SendFailure(e))
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(destination = %self.destination, "TCP sink closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for TcpHandle {
    fn drop(&mut self) {
        self.close();
    }
}
