//! Result aggregation from multiple pacers

use std::time::Duration;

use crate::pacer::PacerStats;

/// Aggregated send statistics from all pacers
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    /// Number of pacers that completed
    pub total_pacers: usize,

    /// Total sends dispatched
    pub total_issued: u64,

    /// Total sends accepted
    pub total_sent: u64,

    /// Total sends failed
    pub total_failed: u64,

    /// Total burst cycles
    pub total_cycles: usize,

    /// Widest pacer window (earliest start to latest end)
    pub total_duration: Duration,

    /// Overall accepted sends per second
    pub messages_per_second: f64,
}

impl AggregatedStats {
    /// Fraction of completed sends that failed (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        let completed = self.total_sent + self.total_failed;
        if completed > 0 {
            self.total_failed as f64 / completed as f64
        } else {
            0.0
        }
    }
}

/// Aggregate statistics from multiple pacers
pub fn aggregate_pacer_stats(stats: &[PacerStats]) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats::default();
    }

    let mut merged = PacerStats::new();
    for s in stats {
        merged.merge(s);
    }

    let total_duration = merged.elapsed().unwrap_or(Duration::ZERO);
    let secs = total_duration.as_secs_f64();
    let messages_per_second = if secs > 0.0 {
        merged.sent as f64 / secs
    } else {
        0.0
    };

    AggregatedStats {
        total_pacers: stats.len(),
        total_issued: merged.issued,
        total_sent: merged.sent,
        total_failed: merged.failed,
        total_cycles: merged.cycles,
        total_duration,
        messages_per_second,
    }
}
