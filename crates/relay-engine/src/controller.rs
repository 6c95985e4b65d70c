//! Command loop that turns front-end commands into relay calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use relay_feed::FrameSource;
use relay_ipc::{RelayCommand, RelayEvent, RelayState, StreamTarget};
use relay_transport::{
    Destination, LiveStreamModule, RtmpLiveStream, TcpSink, TransportSink, UdpSink,
};

use crate::config::RelayConfig;
use crate::live::LiveStreamRelay;
use crate::relay::FrameRelay;

/// Owns the relays and serves commands until shut down.
///
/// UDP and TCP targets get a fresh [`FrameRelay`] per start; RTMP targets
/// go through one long-lived [`LiveStreamRelay`]. Only one target streams
/// at a time and it must be stopped before another is started.
pub struct StreamController {
    command_rx: Receiver<RelayCommand>,
    event_tx: Sender<RelayEvent>,
    source: Arc<dyn FrameSource>,
    config: RelayConfig,
    relay: Option<(StreamTarget, FrameRelay)>,
    live: LiveStreamRelay,
    live_target: Option<StreamTarget>,
    last_metrics: Instant,
}

impl StreamController {
    /// Create a controller using the RTMP module for live-stream targets.
    pub fn new(
        command_rx: Receiver<RelayCommand>,
        event_tx: Sender<RelayEvent>,
        source: Arc<dyn FrameSource>,
        config: RelayConfig,
    ) -> Self {
        let module = RtmpLiveStream::new(Arc::clone(&source), config.rtmp.clone());
        Self::with_live_module(command_rx, event_tx, source, config, Box::new(module))
    }

    /// Create a controller with a specific live-stream module.
    pub fn with_live_module(
        command_rx: Receiver<RelayCommand>,
        event_tx: Sender<RelayEvent>,
        source: Arc<dyn FrameSource>,
        config: RelayConfig,
        module: Box<dyn LiveStreamModule>,
    ) -> Self {
        let live = LiveStreamRelay::new(module, event_tx.clone());
        Self {
            command_rx,
            event_tx,
            source,
            config,
            relay: None,
            live,
            live_target: None,
            last_metrics: Instant::now(),
        }
    }

    /// Run the controller (blocking).
    #[instrument(name = "controller_run", skip(self))]
    pub fn run(&mut self) {
        info!("Controller starting");
        self.send_event(RelayEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    self.stop();
                    break;
                }
            }

            self.maybe_emit_metrics();
        }

        info!("Controller stopped");
    }

    /// Handle a command. Returns false if the loop should end.
    fn handle_command(&mut self, command: RelayCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            RelayCommand::Start { target } => self.start(target),
            RelayCommand::Stop => self.stop(),
            RelayCommand::DeviceDisconnected => {
                info!("Video device disconnected");
                self.stop();
            }
            RelayCommand::GetState => self.send_state(),
            RelayCommand::GetMetrics => self.emit_metrics(),
            RelayCommand::Shutdown => {
                self.stop();
                self.send_event(RelayEvent::Shutdown);
                return false;
            }
        }

        true
    }

    fn active_target(&self) -> Option<&StreamTarget> {
        self.relay
            .as_ref()
            .map(|(target, _)| target)
            .or(self.live_target.as_ref())
    }

    fn start(&mut self, target: StreamTarget) {
        if let Some(active) = self.active_target() {
            if *active == target {
                debug!(%target, "Target already streaming, ignoring start");
            } else {
                self.send_error(format!("{} is streaming; stop it before starting {}", active, target));
            }
            return;
        }

        match &target {
            StreamTarget::Rtmp { url } => {
                if let Err(e) = self.live.start(url) {
                    self.send_error(e.to_string());
                    return;
                }
                self.live_target = Some(target);
            }
            StreamTarget::Udp { host, port } | StreamTarget::Tcp { host, port } => {
                let destination = match Destination::resolve(host, *port) {
                    Ok(destination) => destination,
                    Err(e) => {
                        self.send_error(e.to_string());
                        return;
                    }
                };

                let relay = FrameRelay::with_failure_alarm(
                    Arc::clone(&self.source),
                    self.transport_for(&target),
                    self.event_tx.clone(),
                    self.config.failure_alarm_threshold,
                );

                if let Err(e) = relay.start(destination) {
                    self.send_error(e.to_string());
                    return;
                }
                self.relay = Some((target, relay));
            }
        }

        self.last_metrics = Instant::now();
    }

    fn stop(&mut self) {
        if let Some((target, relay)) = self.relay.take() {
            info!(%target, "Stopping relay");
            relay.stop();
        }
        if self.live_target.take().is_some() {
            self.live.stop();
        }
    }

    fn transport_for(&self, target: &StreamTarget) -> Arc<dyn TransportSink> {
        match target {
            StreamTarget::Tcp { .. } => Arc::new(TcpSink::new(self.config.tcp.clone())),
            _ => Arc::new(UdpSink::new(self.config.udp.clone())),
        }
    }

    fn current_state(&self) -> RelayState {
        match (&self.relay, &self.live_target) {
            (Some((_, relay)), _) => relay.state(),
            (None, Some(_)) => self.live.state(),
            (None, None) => RelayState::Idle,
        }
    }

    fn send_state(&self) {
        let state = self.current_state();
        let detail = self
            .active_target()
            .map(|target| target.to_string())
            .unwrap_or_default();
        self.send_event(RelayEvent::StateChanged {
            previous: state,
            current: state,
            detail,
        });
    }

    fn maybe_emit_metrics(&mut self) {
        let interval = Duration::from_millis(self.config.metrics_interval_ms);
        if interval.is_zero() || self.last_metrics.elapsed() < interval {
            return;
        }
        if self.relay.is_some() {
            self.emit_metrics();
        }
        self.last_metrics = Instant::now();
    }

    fn emit_metrics(&self) {
        match &self.relay {
            Some((_, relay)) => {
                self.send_event(RelayEvent::Metrics(relay.metrics()));
                relay.mark_reported();
            }
            None => self.send_event(RelayEvent::Metrics(Default::default())),
        }
    }

    fn send_error(&self, message: String) {
        warn!("{}", message);
        self.send_event(RelayEvent::Error { message });
    }

    fn send_event(&self, event: RelayEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop();
    }
}
