//! Fake sinks, modules and event helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use relay_feed::Frame;
use relay_ipc::{RelayEvent, RelayState};
use relay_transport::{
    result_code, Destination, LiveStreamModule, SinkHandle, TransportError, TransportResult,
    TransportSink,
};

/// What a [`RecordingSink`] and its handles observed.
#[derive(Default)]
pub struct SinkLog {
    pub opened: AtomicUsize,
    pub open_handles: AtomicUsize,
    pub max_open_handles: AtomicUsize,
    pub sends_after_close: AtomicUsize,
    pub sent: Mutex<Vec<(u64, usize)>>,
}

impl SinkLog {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_sequences(&self) -> Vec<u64> {
        self.sent.lock().iter().map(|(sequence, _)| *sequence).collect()
    }
}

/// Blocks [`TransportSink::open`] until released.
pub struct OpenGate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

/// In-memory sink that records every frame it is handed.
pub struct RecordingSink {
    pub log: Arc<SinkLog>,
    fail_on: HashSet<u64>,
    fail_all: bool,
    refuse_open: bool,
    send_delay: Option<Duration>,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            log: Arc::new(SinkLog::default()),
            fail_on: HashSet::new(),
            fail_all: false,
            refuse_open: false,
            send_delay: None,
            gate: None,
        }
    }

    /// Fail the sends of the given frame sequence numbers.
    pub fn failing_on(mut self, sequences: &[u64]) -> Self {
        self.fail_on = sequences.iter().copied().collect();
        self
    }

    /// Fail every send.
    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Refuse to open.
    pub fn refusing(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    /// Hold each send for `delay`.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Make `open` wait until the returned gate is released.
    pub fn gated(mut self) -> (Self, OpenGate) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        self.gate = Some((entered_tx, release_rx));
        (
            self,
            OpenGate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl TransportSink for RecordingSink {
    fn open(&self, _destination: &Destination) -> TransportResult<Box<dyn SinkHandle>> {
        if let Some((entered, release)) = &self.gate {
            let _ = entered.send(());
            let _ = release.recv();
        }

        if self.refuse_open {
            return Err(TransportError::BindFailure(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no local address",
            )));
        }

        self.log.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.log.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_open_handles.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(RecordingHandle {
            log: Arc::clone(&self.log),
            fail_on: self.fail_on.clone(),
            fail_all: self.fail_all,
            send_delay: self.send_delay,
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct RecordingHandle {
    log: Arc<SinkLog>,
    fail_on: HashSet<u64>,
    fail_all: bool,
    send_delay: Option<Duration>,
    closed: bool,
}

impl SinkHandle for RecordingHandle {
    fn send(&mut self, frame: Frame<'_>) -> TransportResult<usize> {
        if self.closed {
            self.log.sends_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::ClosedHandle);
        }
        if let Some(delay) = self.send_delay {
            thread::sleep(delay);
        }
        if self.fail_all || self.fail_on.contains(&frame.sequence()) {
            return Err(TransportError::SendFailure(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "destination unreachable",
            )));
        }

        self.log.sent.lock().push((frame.sequence(), frame.len()));
        Ok(frame.len())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Live-stream module that answers `start_stream` with a fixed code.
pub struct ScriptedModule {
    code: i32,
    url: Option<String>,
    streaming: bool,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModule {
    pub fn new(code: i32) -> Self {
        Self {
            code,
            url: None,
            streaming: false,
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl LiveStreamModule for ScriptedModule {
    fn set_destination_url(&mut self, url: &str) {
        self.url = Some(url.to_string());
    }

    fn start_stream(&mut self) -> i32 {
        let Some(url) = self.url.clone() else {
            return result_code::INVALID_URL;
        };
        if self.code == result_code::SUCCESS {
            self.streaming = true;
            self.urls.lock().push(url);
        }
        self.code
    }

    fn stop_stream(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn is_audio_enabled(&self) -> bool {
        false
    }
}

pub fn loopback(port: u16) -> Destination {
    Destination::new(([127, 0, 0, 1], port).into())
}

/// Wait for the first event matching `predicate`, discarding the others.
pub fn wait_for<F>(events: &Receiver<RelayEvent>, timeout: Duration, predicate: F) -> Option<RelayEvent>
where
    F: Fn(&RelayEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

pub fn wait_for_state(events: &Receiver<RelayEvent>, state: RelayState) -> bool {
    wait_for(events, Duration::from_secs(5), |event| {
        matches!(event, RelayEvent::StateChanged { current, .. } if *current == state)
    })
    .is_some()
}

/// Every state reported so far, in order.
pub fn drain_states(events: &Receiver<RelayEvent>) -> Vec<RelayState> {
    events
        .try_iter()
        .filter_map(|event| match event {
            RelayEvent::StateChanged { current, .. } => Some(current),
            _ => None,
        })
        .collect()
}
