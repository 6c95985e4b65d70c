//! RTMP live-stream module.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use relay_feed::{Frame, FrameListener, FrameSource, ListenerId};
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
    PublishRequestType,
};
use rml_rtmp::time::RtmpTimestamp;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::error::TransportError;
use crate::live::{describe_result_code, result_code, LiveStreamModule};
use crate::nal::FlvVideoPacketizer;
use crate::{TransportResult, DEFAULT_RTMP_PORT, PACKET_CHANNEL_CAPACITY};

/// RTMP module configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtmpConfig {
    /// Deadline for handshake, connect and publish, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Deadline for tearing down the session, in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Outgoing packet queue length.
    pub packet_channel_capacity: usize,

    /// Publish audio alongside video.
    pub audio_enabled: bool,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            shutdown_timeout_ms: 2000,
            packet_channel_capacity: PACKET_CHANNEL_CAPACITY,
            audio_enabled: false,
        }
    }
}

/// Parsed `rtmp://host[:port]/app/stream_key` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpEndpoint {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: String,
}

impl RtmpEndpoint {
    /// Parse a publish URL. The last path segment is the stream key and
    /// everything before it the application name.
    pub fn parse(url: &str) -> TransportResult<Self> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidDestination(e.to_string()))?;

        if parsed.scheme() != "rtmp" {
            return Err(TransportError::InvalidDestination(format!(
                "Unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidDestination("Missing host".to_string()))?
            .to_string();
        let port = parsed.port().unwrap_or(DEFAULT_RTMP_PORT);

        let path = parsed.path().trim_matches('/');
        let (app, key) = path.rsplit_once('/').ok_or_else(|| {
            TransportError::InvalidDestination("URL path must be /app/stream_key".to_string())
        })?;

        if app.is_empty() || key.is_empty() {
            return Err(TransportError::InvalidDestination(
                "URL path must be /app/stream_key".to_string(),
            ));
        }

        let stream_key = match parsed.query() {
            Some(query) => format!("{}?{}", key, query),
            None => key.to_string(),
        };

        Ok(Self {
            host,
            port,
            app: app.to_string(),
            stream_key,
        })
    }
}

/// A video packet queued for publishing.
#[derive(Debug, Clone)]
struct RtmpPacket {
    data: Bytes,
    timestamp_ms: u32,
    can_be_dropped: bool,
}

/// Transport statistics.
#[derive(Debug, Clone, Default)]
pub struct TransportStatistics {
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
}

#[derive(Default)]
struct Counters {
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
}

struct ActiveStream {
    runtime: Runtime,
    listener: ListenerId,
    should_stop: Arc<AtomicBool>,
    publishing: Arc<AtomicBool>,
}

/// Publishes the frame source's H.264 stream to an RTMP server.
///
/// Once started it subscribes to the frame source on its own; frames are
/// packetized on the producer thread and queued to a publisher task. A
/// full queue drops droppable packets. A publish error ends the stream;
/// there is no reconnect.
pub struct RtmpLiveStream {
    source: Arc<dyn FrameSource>,
    config: RtmpConfig,
    url: Option<String>,
    active: Option<ActiveStream>,
    counters: Arc<Counters>,
}

impl RtmpLiveStream {
    /// Create a module reading frames from `source`.
    pub fn new(source: Arc<dyn FrameSource>, config: RtmpConfig) -> Self {
        Self {
            source,
            config,
            url: None,
            active: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Get transport statistics.
    pub fn statistics(&self) -> TransportStatistics {
        TransportStatistics {
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
        }
    }

    fn fail(&self, code: i32, reason: impl std::fmt::Display) -> i32 {
        warn!(code, "RTMP start failed ({}): {}", describe_result_code(code), reason);
        code
    }
}

impl LiveStreamModule for RtmpLiveStream {
    fn set_destination_url(&mut self, url: &str) {
        debug!(url, "RTMP destination set");
        self.url = Some(url.to_string());
    }

    #[instrument(name = "rtmp_start", skip(self))]
    fn start_stream(&mut self) -> i32 {
        if self.active.is_some() {
            return self.fail(result_code::ALREADY_STREAMING, "stream already running");
        }

        let url = match self.url.as_deref() {
            Some(url) => url,
            None => return self.fail(result_code::INVALID_URL, "no destination URL"),
        };
        let endpoint = match RtmpEndpoint::parse(url) {
            Ok(endpoint) => endpoint,
            Err(e) => return self.fail(result_code::INVALID_URL, e),
        };

        let runtime = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => return self.fail(result_code::RUNTIME_FAILED, e),
        };

        info!(host = %endpoint.host, port = endpoint.port, app = %endpoint.app, "Starting RTMP stream");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connection =
            match runtime.block_on(async { tokio::time::timeout(timeout, connect_rtmp(&endpoint)).await }) {
                Ok(Ok(connection)) => connection,
                Ok(Err(e)) => return self.fail(result_code::CONNECTION_FAILED, e),
                Err(_) => {
                    return self.fail(
                        result_code::CONNECTION_FAILED,
                        format!("no publish acceptance within {:?}", timeout),
                    )
                }
            };

        let (sender, receiver) = crossbeam_channel::bounded(self.config.packet_channel_capacity.max(1));
        let should_stop = Arc::new(AtomicBool::new(false));
        let publishing = Arc::new(AtomicBool::new(true));

        runtime.spawn(run_publisher(
            connection,
            receiver,
            Arc::clone(&should_stop),
            Arc::clone(&publishing),
            Arc::clone(&self.counters),
        ));

        let listener = packet_listener(sender, Arc::clone(&self.counters));
        let listener = match self.source.subscribe(listener) {
            Ok(id) => id,
            Err(e) => {
                should_stop.store(true, Ordering::SeqCst);
                runtime.shutdown_timeout(Duration::from_millis(self.config.shutdown_timeout_ms));
                return self.fail(result_code::FEED_UNAVAILABLE, e);
            }
        };

        self.active = Some(ActiveStream {
            runtime,
            listener,
            should_stop,
            publishing,
        });

        info!("RTMP stream started");
        result_code::SUCCESS
    }

    #[instrument(name = "rtmp_stop", skip(self))]
    fn stop_stream(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        // Detaching the listener drops the packet sender, which ends the
        // publisher loop.
        self.source.unsubscribe(active.listener);
        active.should_stop.store(true, Ordering::SeqCst);
        active
            .runtime
            .shutdown_timeout(Duration::from_millis(self.config.shutdown_timeout_ms));

        let stats = self.statistics();
        info!(
            packets_sent = stats.packets_sent,
            packets_dropped = stats.packets_dropped,
            "RTMP stream stopped"
        );
    }

    fn is_streaming(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.publishing.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_audio_enabled(&self) -> bool {
        self.config.audio_enabled
    }
}

impl Drop for RtmpLiveStream {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Build the frame listener: packetize on the producer thread and queue
/// without blocking it.
fn packet_listener(sender: Sender<RtmpPacket>, counters: Arc<Counters>) -> FrameListener {
    let packetizer = Mutex::new(FlvVideoPacketizer::new());
    let started = Instant::now();

    Arc::new(move |frame: Frame<'_>| {
        let timestamp_ms = rtmp_timestamp(started.elapsed());
        let tags = packetizer.lock().packetize(frame.as_bytes());

        for tag in tags {
            let packet = RtmpPacket {
                data: tag.data,
                timestamp_ms,
                can_be_dropped: !tag.is_keyframe && !tag.is_sequence_header,
            };
            match sender.try_send(packet) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(sequence = frame.sequence(), "RTMP queue full, packet dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    })
}

/// Milliseconds since the stream started, as a 32-bit RTMP timestamp.
///
/// RTMP timestamps wrap at 2^32 ms (about 49.7 days).
fn rtmp_timestamp(elapsed: Duration) -> u32 {
    (elapsed.as_millis() % (u64::from(u32::MAX) as u128 + 1)) as u32
}

async fn run_publisher(
    mut connection: RtmpConnection,
    receiver: Receiver<RtmpPacket>,
    should_stop: Arc<AtomicBool>,
    publishing: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    loop {
        if should_stop.load(Ordering::SeqCst) {
            break;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(packet) => {
                if let Err(e) = send_packet(&mut connection, &packet).await {
                    error!("RTMP publish failed, ending stream: {}", e);
                    counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                counters
                    .bytes_sent
                    .fetch_add(packet.data.len() as u64, Ordering::Relaxed);
                counters.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Packet channel disconnected");
                break;
            }
        }
    }

    publishing.store(false, Ordering::SeqCst);
    let _ = connection.stream.shutdown().await;
}

/// RTMP connection with session state.
struct RtmpConnection {
    stream: TcpStream,
    session: ClientSession,
}

async fn write_outbound(stream: &mut TcpStream, results: Vec<ClientSessionResult>) -> TransportResult<()> {
    for result in results {
        if let ClientSessionResult::OutboundResponse(packet) = result {
            stream.write_all(&packet.bytes).await?;
        }
    }
    Ok(())
}

/// Read from the server until `accept` returns true for a raised event.
async fn await_event<F>(stream: &mut TcpStream, session: &mut ClientSession, mut accept: F) -> TransportResult<()>
where
    F: FnMut(&ClientSessionEvent) -> TransportResult<bool>,
{
    let mut read_buf = vec![0u8; 4096];

    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            return Err(TransportError::ConnectionFailed("Connection closed by server".to_string()));
        }

        let results = session
            .handle_input(&read_buf[..n])
            .map_err(|e| TransportError::Protocol(format!("Session input error: {:?}", e)))?;

        let mut accepted = false;
        for result in results {
            match result {
                ClientSessionResult::OutboundResponse(packet) => {
                    stream.write_all(&packet.bytes).await?;
                }
                ClientSessionResult::RaisedEvent(event) => {
                    if accept(&event)? {
                        accepted = true;
                    } else {
                        trace!("Received event: {:?}", event);
                    }
                }
                _ => {}
            }
        }

        if accepted {
            return Ok(());
        }
    }
}

async fn handshake(stream: &mut TcpStream) -> TransportResult<Vec<u8>> {
    let mut handshake = Handshake::new(PeerType::Client);

    let p0_p1 = handshake
        .generate_outbound_p0_and_p1()
        .map_err(|e| TransportError::Protocol(format!("Handshake generation failed: {:?}", e)))?;
    stream.write_all(&p0_p1).await?;

    let mut buf = vec![0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::ConnectionFailed(
                "Connection closed during handshake".to_string(),
            ));
        }

        match handshake.process_bytes(&buf[..n]) {
            Ok(HandshakeProcessResult::InProgress { response_bytes }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }
            }
            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            }) => {
                if !response_bytes.is_empty() {
                    stream.write_all(&response_bytes).await?;
                }
                return Ok(remaining_bytes);
            }
            Err(e) => {
                return Err(TransportError::Protocol(format!("Handshake failed: {:?}", e)));
            }
        }
    }
}

async fn connect_rtmp(endpoint: &RtmpEndpoint) -> TransportResult<RtmpConnection> {
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;

    debug!("TCP connection established, starting handshake");
    let leftover = handshake(&mut stream).await?;

    let (mut session, initial_results) = ClientSession::new(ClientSessionConfig::new())
        .map_err(|e| TransportError::Protocol(format!("Session creation failed: {:?}", e)))?;
    write_outbound(&mut stream, initial_results).await?;

    if !leftover.is_empty() {
        let results = session
            .handle_input(&leftover)
            .map_err(|e| TransportError::Protocol(format!("Session input error: {:?}", e)))?;
        write_outbound(&mut stream, results).await?;
    }

    debug!(app = %endpoint.app, "Requesting RTMP connection");
    let request = session
        .request_connection(endpoint.app.clone())
        .map_err(|e| TransportError::Protocol(format!("Connection request failed: {:?}", e)))?;
    write_outbound(&mut stream, vec![request]).await?;

    await_event(&mut stream, &mut session, |event| match event {
        ClientSessionEvent::ConnectionRequestAccepted => Ok(true),
        ClientSessionEvent::ConnectionRequestRejected { description } => Err(
            TransportError::ConnectionFailed(format!("Connection rejected: {}", description)),
        ),
        _ => Ok(false),
    })
    .await?;

    debug!("Requesting publish");
    let request = session
        .request_publishing(endpoint.stream_key.clone(), PublishRequestType::Live)
        .map_err(|e| TransportError::Protocol(format!("Publish request failed: {:?}", e)))?;
    write_outbound(&mut stream, vec![request]).await?;

    await_event(&mut stream, &mut session, |event| {
        Ok(matches!(event, ClientSessionEvent::PublishRequestAccepted))
    })
    .await?;

    info!("RTMP connection established and publishing started");
    Ok(RtmpConnection { stream, session })
}

async fn send_packet(connection: &mut RtmpConnection, packet: &RtmpPacket) -> TransportResult<()> {
    let result = connection
        .session
        .publish_video_data(
            packet.data.clone(),
            RtmpTimestamp::new(packet.timestamp_ms),
            packet.can_be_dropped,
        )
        .map_err(|e| TransportError::Protocol(format!("Failed to publish data: {:?}", e)))?;

    if let ClientSessionResult::OutboundResponse(rtmp_packet) = result {
        connection.stream.write_all(&rtmp_packet.bytes).await?;
    }

    Ok(())
}
