//! The frame relay: frame source in, transport sink out.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use relay_feed::{Frame, FrameListener, FrameSource, ListenerId};
use relay_ipc::{RelayEvent, RelayMetrics, RelayState};
use relay_transport::{Destination, SinkHandle, TransportError, TransportSink};

use crate::error::RelayError;
use crate::lifecycle::Lifecycle;
use crate::metrics::MetricsCollector;
use crate::{RelayResult, DEFAULT_FAILURE_ALARM_THRESHOLD};

/// State reachable from the frame callback.
struct RelayCore {
    lifecycle: Lifecycle,
    handle: Mutex<Option<Box<dyn SinkHandle>>>,
    metrics: MetricsCollector,
}

impl RelayCore {
    /// Frame callback. Runs on the producer's thread.
    fn forward(&self, frame: Frame<'_>) {
        if !self.lifecycle.state().is_active() {
            self.metrics.record_inactive_drop();
            return;
        }

        let mut handle = self.handle.lock();

        // Stop flips the state before it takes the handle lock, so this
        // check cannot pass once teardown has begun.
        if !self.lifecycle.state().is_active() {
            self.metrics.record_inactive_drop();
            return;
        }
        let Some(sink) = handle.as_mut() else {
            self.metrics.record_inactive_drop();
            return;
        };

        let error = match sink.send(frame) {
            Ok(sent) => {
                self.metrics.record_forwarded(sent);
                return;
            }
            Err(e) => e,
        };
        drop(handle);

        let oversized = matches!(error, TransportError::OversizedPayload { .. });
        let warning = self.metrics.record_send_failure(oversized);

        warn!(
            sequence = frame.sequence(),
            size = frame.len(),
            "Frame not sent: {}",
            error
        );
        self.lifecycle.emit(RelayEvent::SendFailed {
            sequence: frame.sequence(),
            size: frame.len(),
            message: error.to_string(),
        });

        if let Some(warning) = warning {
            warn!("{}", warning.message());
            self.lifecycle.emit(RelayEvent::Warning(warning));
        }
    }
}

/// Forwards every frame from a [`FrameSource`] to one destination through
/// a [`TransportSink`].
///
/// `start` and `stop` may be called from any thread, concurrently with
/// frame delivery. Frames are forwarded only while the relay is
/// [`RelayState::Active`]; a failed send is reported and the stream
/// carries on. Dropping the relay stops it.
pub struct FrameRelay {
    core: Arc<RelayCore>,
    source: Arc<dyn FrameSource>,
    transport: Arc<dyn TransportSink>,
    subscription: Mutex<Option<ListenerId>>,
    destination: RwLock<Option<Destination>>,
}

impl FrameRelay {
    /// Create an idle relay.
    pub fn new(
        source: Arc<dyn FrameSource>,
        transport: Arc<dyn TransportSink>,
        events: Sender<RelayEvent>,
    ) -> Self {
        Self::with_failure_alarm(source, transport, events, DEFAULT_FAILURE_ALARM_THRESHOLD)
    }

    /// Create an idle relay that warns after `threshold` back-to-back send
    /// failures (zero disables the warning).
    pub fn with_failure_alarm(
        source: Arc<dyn FrameSource>,
        transport: Arc<dyn TransportSink>,
        events: Sender<RelayEvent>,
        threshold: u64,
    ) -> Self {
        Self {
            core: Arc::new(RelayCore {
                lifecycle: Lifecycle::new(events),
                handle: Mutex::new(None),
                metrics: MetricsCollector::new(threshold),
            }),
            source,
            transport,
            subscription: Mutex::new(None),
            destination: RwLock::new(None),
        }
    }

    /// Open the sink and subscribe to the frame source.
    ///
    /// Succeeds without doing anything if already active. Fails with
    /// [`RelayError::AlreadyStarting`] if another start is in flight.
    /// On failure the relay is left idle with nothing open or subscribed.
    #[instrument(name = "relay_start", skip(self), fields(transport = self.transport.name()))]
    pub fn start(&self, destination: Destination) -> RelayResult<()> {
        let Some(_control) = self.core.lifecycle.begin_start()? else {
            debug!("Already active, ignoring start");
            return Ok(());
        };

        let lifecycle = &self.core.lifecycle;
        info!(%destination, "Starting relay");
        lifecycle.transition_to(
            RelayState::Starting,
            format!("{} {}", self.transport.name(), destination),
        );

        let handle = match self.transport.open(&destination) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Relay start failed: {}", e);
                lifecycle.transition_to(RelayState::Idle, format!("start failed: {}", e));
                return Err(RelayError::StartFailed(e));
            }
        };
        *self.core.handle.lock() = Some(handle);

        let core = Arc::clone(&self.core);
        let listener: FrameListener = Arc::new(move |frame: Frame<'_>| core.forward(frame));

        match self.source.subscribe(listener) {
            Ok(id) => *self.subscription.lock() = Some(id),
            Err(e) => {
                error!("Frame source subscription failed: {}", e);
                if let Some(mut handle) = self.core.handle.lock().take() {
                    handle.close();
                }
                lifecycle.transition_to(RelayState::Idle, format!("start failed: {}", e));
                return Err(RelayError::SubscribeFailed(e));
            }
        }

        *self.destination.write() = Some(destination);
        self.core.metrics.start();
        lifecycle.transition_to(
            RelayState::Active,
            format!("{} {}", self.transport.name(), destination),
        );

        info!("Relay active");
        Ok(())
    }

    /// Unsubscribe, then close the sink. Always ends `Idle`; never fails.
    ///
    /// Once this returns no frame reaches the sink. Frames in flight at
    /// the time are either finished before the sink closes or dropped.
    #[instrument(name = "relay_stop", skip(self))]
    pub fn stop(&self) {
        let Some(_control) = self.core.lifecycle.begin_stop() else {
            debug!("Already idle, ignoring stop");
            return;
        };

        let lifecycle = &self.core.lifecycle;
        info!("Stopping relay");
        lifecycle.transition_to(RelayState::Stopping, "");

        if let Some(id) = self.subscription.lock().take() {
            if !self.source.unsubscribe(id) {
                warn!(?id, "Listener was already detached");
            }
        }

        // Waits for a send in progress on the producer thread.
        if let Some(mut handle) = self.core.handle.lock().take() {
            handle.close();
        }

        self.core.metrics.stop();
        *self.destination.write() = None;

        let metrics = self.core.metrics.snapshot();
        lifecycle.transition_to(
            RelayState::Idle,
            format!(
                "{} frames forwarded, {} failed",
                metrics.frames_forwarded, metrics.send_failures
            ),
        );
        info!("Relay stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RelayState {
        self.core.lifecycle.state()
    }

    /// Destination while active.
    pub fn destination(&self) -> Option<Destination> {
        *self.destination.read()
    }

    /// Counters since creation, with bitrate and uptime for the current
    /// run and fps since the last [`FrameRelay::mark_reported`].
    pub fn metrics(&self) -> RelayMetrics {
        self.core.metrics.snapshot()
    }

    /// Reset the fps window after a metrics report.
    pub fn mark_reported(&self) {
        self.core.metrics.mark_reported();
    }

    /// Name of the transport in use.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }
}

impl Drop for FrameRelay {
    fn drop(&mut self) {
        self.stop();
    }
}
