//! Start/stop state machine shared by both relay kinds.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use relay_ipc::{RelayEvent, RelayState};

use crate::error::RelayError;
use crate::RelayResult;

/// Relay state plus the control lock that serializes start and stop.
///
/// `Starting` and `Stopping` are only ever observed while a caller holds
/// the control lock. A start is claimed through `starting` before the lock
/// is taken, so a second start never queues behind the first.
pub(crate) struct Lifecycle {
    state: RwLock<RelayState>,
    control: Mutex<()>,
    starting: AtomicBool,
    events: Sender<RelayEvent>,
}

/// Held for the duration of a stop.
pub(crate) type ControlGuard<'a> = MutexGuard<'a, ()>;

/// Held for the duration of a start. Releases the control lock, then the
/// start claim.
pub(crate) struct StartGuard<'a> {
    control: Option<ControlGuard<'a>>,
    starting: &'a AtomicBool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        drop(self.control.take());
        self.starting.store(false, Ordering::Release);
    }
}

impl Lifecycle {
    pub(crate) fn new(events: Sender<RelayEvent>) -> Self {
        Self {
            state: RwLock::new(RelayState::Idle),
            control: Mutex::new(()),
            starting: AtomicBool::new(false),
            events,
        }
    }

    pub(crate) fn state(&self) -> RelayState {
        *self.state.read()
    }

    /// Claim the right to start.
    ///
    /// Returns `Ok(None)` when already active. A start in flight elsewhere
    /// is rejected without blocking; a stop in flight is waited out.
    pub(crate) fn begin_start(&self) -> RelayResult<Option<StartGuard<'_>>> {
        if self
            .starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RelayError::AlreadyStarting);
        }

        let guard = StartGuard {
            control: Some(self.control.lock()),
            starting: &self.starting,
        };

        match self.state() {
            RelayState::Idle => Ok(Some(guard)),
            RelayState::Active => Ok(None),
            RelayState::Starting | RelayState::Stopping => Err(RelayError::AlreadyStarting),
        }
    }

    /// Claim the right to stop, waiting for any start or stop in flight.
    ///
    /// Returns `None` when already idle.
    pub(crate) fn begin_stop(&self) -> Option<ControlGuard<'_>> {
        let guard = self.control.lock();
        if self.state().is_idle() {
            None
        } else {
            Some(guard)
        }
    }

    pub(crate) fn transition_to(&self, new_state: RelayState, detail: impl Into<String>) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, new_state)
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.emit(RelayEvent::StateChanged {
            previous,
            current: new_state,
            detail: detail.into(),
        });
    }

    /// Report an event without ever blocking the caller.
    pub(crate) fn emit(&self, event: RelayEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn lifecycle() -> (Lifecycle, crossbeam_channel::Receiver<RelayEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Lifecycle::new(tx), rx)
    }

    #[test]
    fn test_start_from_idle_then_active_is_noop() {
        let (lifecycle, _rx) = lifecycle();

        let guard = lifecycle.begin_start().unwrap();
        assert!(guard.is_some());
        lifecycle.transition_to(RelayState::Starting, "");
        lifecycle.transition_to(RelayState::Active, "");
        drop(guard);

        assert!(lifecycle.begin_start().unwrap().is_none());
    }

    #[test]
    fn test_second_start_rejected_while_starting() {
        let (lifecycle, _rx) = lifecycle();

        let guard = lifecycle.begin_start().unwrap().unwrap();
        lifecycle.transition_to(RelayState::Starting, "");

        assert!(matches!(lifecycle.begin_start(), Err(RelayError::AlreadyStarting)));
        drop(guard);
    }

    #[test]
    fn test_second_start_rejected_before_state_changes() {
        let (lifecycle, _rx) = lifecycle();

        // The first claim holds the lock while the state is still Idle.
        let guard = lifecycle.begin_start().unwrap().unwrap();
        assert_eq!(lifecycle.state(), RelayState::Idle);
        assert!(matches!(lifecycle.begin_start(), Err(RelayError::AlreadyStarting)));

        drop(guard);
        assert!(lifecycle.begin_start().unwrap().is_some());
    }

    #[test]
    fn test_second_start_does_not_block_on_first() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let lifecycle = Arc::new(Lifecycle::new(tx));
        let guard = lifecycle.begin_start().unwrap().unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let second = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || {
                let rejected = matches!(lifecycle.begin_start(), Err(RelayError::AlreadyStarting));
                done_tx.send(rejected).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap());
        second.join().unwrap();
        drop(guard);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (lifecycle, rx) = lifecycle();
        assert!(lifecycle.begin_stop().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_start_waits_for_stop_in_flight() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let lifecycle = Arc::new(Lifecycle::new(tx));
        lifecycle.transition_to(RelayState::Active, "");

        let guard = lifecycle.begin_stop().unwrap();
        lifecycle.transition_to(RelayState::Stopping, "");

        let starter = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || lifecycle.begin_start().map(|guard| guard.is_some()))
        };

        thread::sleep(Duration::from_millis(20));
        lifecycle.transition_to(RelayState::Idle, "");
        drop(guard);

        assert!(starter.join().unwrap().unwrap());
    }

    #[test]
    fn test_transition_emits_event() {
        let (lifecycle, rx) = lifecycle();
        lifecycle.transition_to(RelayState::Starting, "udp 127.0.0.1:5000");

        match rx.try_recv().unwrap() {
            RelayEvent::StateChanged {
                previous,
                current,
                detail,
            } => {
                assert_eq!(previous, RelayState::Idle);
                assert_eq!(current, RelayState::Starting);
                assert_eq!(detail, "udp 127.0.0.1:5000");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
