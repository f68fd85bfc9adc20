//! Consumer counters and the periodic throughput report

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Point-in-time view of the consumer counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub frames_received: u64,
    pub messages_published: u64,
    pub duplicates_skipped: u64,
    pub messages_rejected: u64,
    pub publish_errors: u64,
    /// Messages handled after the dedup store filled up
    pub untracked_ids: u64,
}

/// Thread-safe statistics collector
#[derive(Clone, Default)]
pub struct StatsCollector {
    frames_received: Arc<AtomicU64>,
    messages_published: Arc<AtomicU64>,
    duplicates_skipped: Arc<AtomicU64>,
    messages_rejected: Arc<AtomicU64>,
    publish_errors: Arc<AtomicU64>,
    untracked_ids: Arc<AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_untracked(&self) {
        self.untracked_ids.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            untracked_ids: self.untracked_ids.load(Ordering::Relaxed),
        }
    }
}

/// Windowed message counter.
///
/// Each call to [`record`](Self::record) counts one message; once the window
/// has lasted at least `interval`, the rate `count / interval` is logged and
/// the window restarts at the time of that call. The divisor is the nominal
/// interval, not the elapsed time, and nothing is reported while idle.
#[derive(Debug)]
pub struct ThroughputReporter {
    interval: Duration,
    window_start: Instant,
    count: u64,
}

impl ThroughputReporter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, window_start: Instant) -> Self {
        Self {
            interval,
            window_start,
            count: 0,
        }
    }

    /// Count one message at `now`; returns the rate when a report was emitted.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;

        if now.saturating_duration_since(self.window_start) < self.interval {
            return None;
        }

        let rate = self.count as f64 / self.interval.as_secs_f64();
        info!(
            "Processed {} messages in {} seconds. Rate: {:.2} messages per second",
            self.count,
            self.interval.as_secs(),
            rate
        );

        self.count = 0;
        self.window_start = now;
        Some(rate)
    }

    /// Messages counted in the current window
    pub fn pending(&self) -> u64 {
        self.count
    }
}
