//! Run-wide throughput statistics.
//!
//! All counters live behind one lock so every update sees, and returns, a
//! mutually consistent view. Watermarks (max TPS, max pending, max wait) only
//! ever increase.

use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default periodic TPS window.
pub const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(60);

struct RunningStats {
    started: Instant,
    window_started: Instant,
    finished: u64,
    window_finished: u64,
    pending: u64,
    max_tps: f64,
    max_pending: u64,
    max_wait: Duration,
    period_tps: f64,
    submitted: u64,
    send_failures: u64,
    confirmation_failures: u64,
}

impl RunningStats {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            window_started: now,
            finished: 0,
            window_finished: 0,
            pending: 0,
            max_tps: 0.0,
            max_pending: 0,
            max_wait: Duration::ZERO,
            period_tps: 0.0,
            submitted: 0,
            send_failures: 0,
            confirmation_failures: 0,
        }
    }

    fn average_tps(&self, now: Instant) -> f64 {
        rate(self.finished, now.duration_since(self.started))
    }

    fn snapshot(&self, now: Instant) -> StatsSnapshot {
        StatsSnapshot {
            elapsed: now.duration_since(self.started),
            max_tps: self.max_tps,
            max_pending: self.max_pending,
            max_wait: self.max_wait,
            period_tps: self.period_tps,
            average_tps: self.average_tps(now),
            finished: self.finished,
            pending: self.pending,
            submitted: self.submitted,
            send_failures: self.send_failures,
            confirmation_failures: self.confirmation_failures,
        }
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Point-in-time view of the run statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub elapsed: Duration,
    pub max_tps: f64,
    pub max_pending: u64,
    pub max_wait: Duration,
    /// TPS of the last completed window.
    pub period_tps: f64,
    pub average_tps: f64,
    pub finished: u64,
    pub pending: u64,
    pub submitted: u64,
    pub send_failures: u64,
    pub confirmation_failures: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MaxTPS: {:.6}; MaxPendingTx: {}; MaxWaitTime: {:.6}; Period TPS: {:.6}; \
             Average TPS: {:.6}; FinishedTx: {}; PendingTx: {};",
            self.max_tps,
            self.max_pending,
            self.max_wait.as_secs_f64(),
            self.period_tps,
            self.average_tps,
            self.finished,
            self.pending,
        )
    }
}

/// Shared statistics aggregator, passed to every branch as an `Arc`.
pub struct StatsAggregator {
    window: Duration,
    inner: Mutex<RunningStats>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_WINDOW)
    }
}

impl StatsAggregator {
    /// Start the run clock now, with the given periodic window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(RunningStats::new(Instant::now())),
        }
    }

    /// A transaction was broadcast and is now pending.
    pub fn record_submitted(&self) -> StatsSnapshot {
        let now = Instant::now();
        let mut stats = self.inner.lock();

        let window_elapsed = now.duration_since(stats.window_started);
        if window_elapsed > self.window {
            stats.period_tps = rate(stats.window_finished, window_elapsed);
            stats.max_tps = stats.max_tps.max(stats.period_tps);
            stats.window_started = now;
            stats.window_finished = 0;
        }

        let average = stats.average_tps(now);
        stats.max_tps = stats.max_tps.max(average);

        stats.submitted += 1;
        stats.pending += 1;
        stats.max_pending = stats.max_pending.max(stats.pending);

        stats.snapshot(now)
    }

    /// A pending transaction was mined after waiting `wait`.
    pub fn record_confirmed(&self, wait: Duration) -> StatsSnapshot {
        let now = Instant::now();
        let mut stats = self.inner.lock();

        stats.max_wait = stats.max_wait.max(wait);
        stats.pending = stats.pending.saturating_sub(1);
        stats.finished += 1;
        stats.window_finished += 1;

        stats.snapshot(now)
    }

    /// A pending transaction will never be confirmed.
    pub fn record_confirmation_failed(&self) -> StatsSnapshot {
        let now = Instant::now();
        let mut stats = self.inner.lock();

        stats.pending = stats.pending.saturating_sub(1);
        stats.confirmation_failures += 1;

        stats.snapshot(now)
    }

    /// A transaction could not be broadcast. Pending is untouched.
    pub fn record_send_failed(&self) {
        self.inner.lock().send_failures += 1;
    }

    pub fn pending(&self) -> u64 {
        self.inner.lock().pending
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        self.inner.lock().snapshot(now)
    }
}
