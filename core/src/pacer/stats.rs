//! Pacer statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Send outcome counters shared between a pacer and its in-flight sends
#[derive(Debug, Default)]
pub struct SendTally {
    issued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl SendTally {
    /// Create a zeroed tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched send
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send the broker accepted
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed send
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Sends dispatched so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Sends accepted so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sends failed so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Statistics reported by each pacer
#[derive(Debug, Default, Clone)]
pub struct PacerStats {
    /// Sends dispatched
    pub issued: u64,

    /// Sends accepted by the broker client
    pub sent: u64,

    /// Sends that failed
    pub failed: u64,

    /// Completed burst cycles
    pub cycles: usize,

    /// Pacer start time
    pub started_at: Option<Instant>,

    /// Pacer end time (after draining)
    pub ended_at: Option<Instant>,
}

impl PacerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Copy the final send counters from a tally
    pub fn absorb(&mut self, tally: &SendTally) {
        self.issued = tally.issued();
        self.sent = tally.sent();
        self.failed = tally.failed();
    }

    /// Sends that have completed either way
    pub fn completed(&self) -> u64 {
        self.sent + self.failed
    }

    /// Fraction of completed sends that failed (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.failed as f64 / n as f64,
        }
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Accepted sends per second over the pacer's lifetime
    pub fn messages_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.sent as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }

    /// Merge counters from another pacer
    ///
    /// Keeps the earliest start and the latest end.
    pub fn merge(&mut self, other: &PacerStats) {
        self.issued += other.issued;
        self.sent += other.sent;
        self.failed += other.failed;
        self.cycles += other.cycles;
        self.started_at = match (self.started_at, other.started_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.ended_at = match (self.ended_at, other.ended_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}
