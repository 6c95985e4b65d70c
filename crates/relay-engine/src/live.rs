//! Lifecycle around a self-contained live-stream module.

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use relay_ipc::{RelayEvent, RelayState};
use relay_transport::{describe_result_code, result_code, LiveStreamModule, TransportError};

use crate::error::RelayError;
use crate::lifecycle::Lifecycle;
use crate::RelayResult;

/// Drives a [`LiveStreamModule`] with the same start/stop contract as
/// [`FrameRelay`](crate::FrameRelay).
///
/// The module owns its send path; this type only sets the URL, starts,
/// stops and maps the module's result code.
pub struct LiveStreamRelay {
    lifecycle: Lifecycle,
    module: Mutex<Box<dyn LiveStreamModule>>,
    url: RwLock<Option<String>>,
}

impl LiveStreamRelay {
    /// Create an idle relay around `module`.
    pub fn new(module: Box<dyn LiveStreamModule>, events: Sender<RelayEvent>) -> Self {
        Self {
            lifecycle: Lifecycle::new(events),
            module: Mutex::new(module),
            url: RwLock::new(None),
        }
    }

    /// Point the module at `url` and start it.
    ///
    /// A nonzero result code leaves the relay idle and surfaces as
    /// [`RelayError::StartFailed`] carrying the code.
    #[instrument(name = "live_start", skip(self))]
    pub fn start(&self, url: &str) -> RelayResult<()> {
        let Some(_control) = self.lifecycle.begin_start()? else {
            debug!("Already active, ignoring start");
            return Ok(());
        };

        info!("Starting live stream");
        self.lifecycle.transition_to(RelayState::Starting, url);

        let code = {
            let mut module = self.module.lock();
            module.set_destination_url(url);
            module.start_stream()
        };

        if code != result_code::SUCCESS {
            error!(code, "Live stream start failed: {}", describe_result_code(code));
            self.lifecycle.transition_to(
                RelayState::Idle,
                format!("start failed: {} ({})", describe_result_code(code), code),
            );
            return Err(RelayError::StartFailed(TransportError::StreamRejected(code)));
        }

        *self.url.write() = Some(url.to_string());
        self.lifecycle.transition_to(RelayState::Active, url);
        Ok(())
    }

    /// Stop the module. Always ends `Idle`; never fails.
    #[instrument(name = "live_stop", skip(self))]
    pub fn stop(&self) {
        let Some(_control) = self.lifecycle.begin_stop() else {
            debug!("Already idle, ignoring stop");
            return;
        };

        info!("Stopping live stream");
        self.lifecycle.transition_to(RelayState::Stopping, "");
        self.module.lock().stop_stream();
        *self.url.write() = None;
        self.lifecycle.transition_to(RelayState::Idle, "");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RelayState {
        self.lifecycle.state()
    }

    /// URL while active.
    pub fn url(&self) -> Option<String> {
        self.url.read().clone()
    }

    /// Returns true while the module reports it is publishing.
    pub fn is_streaming(&self) -> bool {
        self.module.lock().is_streaming()
    }

    /// Whether the module publishes audio.
    pub fn is_audio_enabled(&self) -> bool {
        self.module.lock().is_audio_enabled()
    }
}

impl Drop for LiveStreamRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedModule {
        code: i32,
        url: Option<String>,
        streaming: bool,
        starts: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedModule {
        fn new(code: i32) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let starts = Arc::new(AtomicUsize::new(0));
            let stopped = Arc::new(AtomicBool::new(false));
            let module = Self {
                code,
                url: None,
                streaming: false,
                starts: Arc::clone(&starts),
                stopped: Arc::clone(&stopped),
            };
            (module, starts, stopped)
        }
    }

    impl LiveStreamModule for ScriptedModule {
        fn set_destination_url(&mut self, url: &str) {
            self.url = Some(url.to_string());
        }

        fn start_stream(&mut self) -> i32 {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.streaming = self.code == result_code::SUCCESS && self.url.is_some();
            self.code
        }

        fn stop_stream(&mut self) {
            self.streaming = false;
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn is_streaming(&self) -> bool {
            self.streaming
        }

        fn is_audio_enabled(&self) -> bool {
            true
        }
    }

    const URL: &str = "rtmp://127.0.0.1/live/key";

    #[test]
    fn test_start_and_stop() {
        let (module, starts, stopped) = ScriptedModule::new(result_code::SUCCESS);
        let (tx, _rx) = crossbeam_channel::unbounded();
        let relay = LiveStreamRelay::new(Box::new(module), tx);

        relay.start(URL).unwrap();
        relay.start(URL).unwrap();
        assert_eq!(relay.state(), RelayState::Active);
        assert_eq!(relay.url().as_deref(), Some(URL));
        assert!(relay.is_streaming());
        assert!(relay.is_audio_enabled());
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        relay.stop();
        relay.stop();
        assert_eq!(relay.state(), RelayState::Idle);
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(relay.url(), None);
    }

    #[test]
    fn test_nonzero_code_is_start_failure() {
        let (module, _, stopped) = ScriptedModule::new(result_code::CONNECTION_FAILED);
        let (tx, rx) = crossbeam_channel::unbounded();
        let relay = LiveStreamRelay::new(Box::new(module), tx);

        let err = relay.start(URL).unwrap_err();
        assert!(matches!(
            err,
            RelayError::StartFailed(TransportError::StreamRejected(-2))
        ));
        assert_eq!(relay.state(), RelayState::Idle);
        assert!(!stopped.load(Ordering::SeqCst));

        let states: Vec<RelayState> = rx
            .try_iter()
            .filter_map(|event| match event {
                RelayEvent::StateChanged { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![RelayState::Starting, RelayState::Idle]);
    }
}
