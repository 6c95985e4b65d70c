//! Relay counters and the send-failure alarm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use relay_ipc::{RelayMetrics, RelayWarning};

/// Collects relay counters. Safe to update from the frame callback.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_forwarded: AtomicU64,
    bytes_sent: AtomicU64,
    run_start_bytes: AtomicU64,
    send_failures: AtomicU64,
    oversized_frames: AtomicU64,
    inactive_drops: AtomicU64,
    consecutive_failures: AtomicU64,
    last_report_time: RwLock<Instant>,
    last_frame_count: AtomicU64,
    failure_alarm_threshold: u64,
}

impl MetricsCollector {
    /// Create a collector. A threshold of zero disables the alarm.
    pub fn new(failure_alarm_threshold: u64) -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_forwarded: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            run_start_bytes: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            oversized_frames: AtomicU64::new(0),
            inactive_drops: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_frame_count: AtomicU64::new(0),
            failure_alarm_threshold,
        }
    }

    /// Start timing a run.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count
            .store(self.frames_forwarded.load(Ordering::Relaxed), Ordering::Relaxed);
        self.run_start_bytes
            .store(self.bytes_sent.load(Ordering::Relaxed), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Stop timing.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    /// Record a frame handed to the sink.
    pub fn record_forwarded(&self, bytes: usize) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed send. Returns a warning the moment the current
    /// failure streak reaches the alarm threshold.
    pub fn record_send_failure(&self, oversized: bool) -> Option<RelayWarning> {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        if oversized {
            self.oversized_frames.fetch_add(1, Ordering::Relaxed);
        }

        let streak = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.failure_alarm_threshold > 0 && streak == self.failure_alarm_threshold {
            Some(RelayWarning::SendFailures {
                consecutive: streak,
            })
        } else {
            None
        }
    }

    /// Record a frame that arrived while the relay was not active.
    pub fn record_inactive_drop(&self) {
        self.inactive_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    ///
    /// Counters are totals since creation; `bitrate_kbps` and
    /// `uptime_seconds` cover the current run and `fps` the span since the
    /// last report.
    pub fn snapshot(&self) -> RelayMetrics {
        let now = Instant::now();

        let last_time = *self.last_report_time.read();
        let elapsed = now.duration_since(last_time).as_secs_f32();
        let frames = self.frames_forwarded.load(Ordering::Relaxed);
        let last_frames = self.last_frame_count.load(Ordering::Relaxed);

        let fps = if elapsed > 0.0 {
            frames.saturating_sub(last_frames) as f32 / elapsed
        } else {
            0.0
        };

        let start = *self.start_time.read();
        let bytes = self.bytes_sent.load(Ordering::Relaxed);
        let bitrate_kbps = match start {
            Some(start) => {
                let total = now.duration_since(start).as_secs_f32();
                let run_bytes = bytes.saturating_sub(self.run_start_bytes.load(Ordering::Relaxed));
                if total > 0.0 {
                    ((run_bytes * 8) as f32 / total / 1000.0) as u32
                } else {
                    0
                }
            }
            None => 0,
        };

        RelayMetrics {
            fps,
            bitrate_kbps,
            frames_forwarded: frames,
            bytes_sent: bytes,
            send_failures: self.send_failures.load(Ordering::Relaxed),
            oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
            inactive_drops: self.inactive_drops.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            uptime_seconds: start.map(|s| now.duration_since(s).as_secs()).unwrap_or(0),
        }
    }

    /// Update last report time for FPS calculation.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count
            .store(self.frames_forwarded.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(crate::DEFAULT_FAILURE_ALARM_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_forwarded_and_failed() {
        let metrics = MetricsCollector::new(0);
        metrics.start();

        metrics.record_forwarded(188);
        metrics.record_forwarded(1316);
        metrics.record_send_failure(true);
        metrics.record_inactive_drop();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_forwarded, 2);
        assert_eq!(snapshot.bytes_sent, 1504);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(snapshot.oversized_frames, 1);
        assert_eq!(snapshot.inactive_drops, 1);
        assert_eq!(snapshot.consecutive_failures, 1);
    }

    #[test]
    fn test_alarm_fires_once_per_streak() {
        let metrics = MetricsCollector::new(3);

        assert!(metrics.record_send_failure(false).is_none());
        assert!(metrics.record_send_failure(false).is_none());
        assert_eq!(
            metrics.record_send_failure(false),
            Some(RelayWarning::SendFailures { consecutive: 3 })
        );
        assert!(metrics.record_send_failure(false).is_none());

        metrics.record_forwarded(10);
        assert_eq!(metrics.snapshot().consecutive_failures, 0);

        metrics.record_send_failure(false);
        metrics.record_send_failure(false);
        assert!(metrics.record_send_failure(false).is_some());
    }

    #[test]
    fn test_zero_threshold_disables_alarm() {
        let metrics = MetricsCollector::new(0);
        for _ in 0..100 {
            assert!(metrics.record_send_failure(false).is_none());
        }
    }

    #[test]
    fn test_bitrate_covers_current_run_only() {
        let metrics = MetricsCollector::new(0);
        metrics.start();
        metrics.record_forwarded(10_000_000);
        metrics.stop();

        metrics.start();
        std::thread::sleep(std::time::Duration::from_millis(200));
        metrics.record_forwarded(1000);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_sent, 10_001_000);
        // 8000 bits over at least 0.2 s.
        assert!(snapshot.bitrate_kbps <= 40, "bitrate {}", snapshot.bitrate_kbps);
    }

    #[test]
    fn test_stopped_collector_reports_no_uptime() {
        let metrics = MetricsCollector::default();
        metrics.start();
        metrics.stop();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uptime_seconds, 0);
        assert_eq!(snapshot.bitrate_kbps, 0);
    }
}
