//! Latency and throughput statistics

use crate::message::LatencySample;
use serde::{Deserialize, Serialize};

/// Counters accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    /// Resources the run attempted to create
    pub resources_requested: usize,
    /// Resources successfully created
    pub resources_created: usize,
    /// Resources whose creation failed
    pub resource_failures: usize,
    /// Sends dispatched
    pub messages_issued: u64,
    /// Sends acknowledged by the broker client
    pub messages_sent: u64,
    /// Sends that failed
    pub send_failures: u64,
    /// Messages delivered to subscriptions
    pub messages_received: u64,
    /// Manual acknowledgments that failed
    pub ack_failures: u64,
    /// Resources whose teardown failed
    pub teardown_failures: usize,
}

/// Summary of a completed run (latencies in milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Number of latency samples
    pub count: usize,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Length of the measured window
    pub total_duration_ms: f64,
    /// Messages counted toward throughput
    pub messages_processed: u64,
    /// Throughput over the measured window
    pub messages_per_second: f64,
    /// Run counters
    pub tally: RunTally,
}

impl RunResult {
    /// Attach run counters
    pub fn with_tally(mut self, tally: RunTally) -> Self {
        self.tally = tally;
        self
    }

    /// Fraction of dispatched sends that failed (0.0 - 1.0)
    pub fn send_error_rate(&self) -> f64 {
        let issued = self.tally.messages_sent + self.tally.send_failures;
        if issued == 0 {
            0.0
        } else {
            self.tally.send_failures as f64 / issued as f64
        }
    }
}

/// Summarize latency samples and throughput
///
/// Zero samples yield zero min/max/mean; a zero-length window yields zero
/// throughput.
pub fn summarize(
    samples: &[LatencySample],
    messages_processed: u64,
    run_duration_ms: f64,
) -> RunResult {
    let messages_per_second = if run_duration_ms > 0.0 {
        (messages_processed as f64 / run_duration_ms) * 1000.0
    } else {
        0.0
    };

    let mut result = RunResult {
        total_duration_ms: run_duration_ms.max(0.0),
        messages_processed,
        messages_per_second,
        ..Default::default()
    };

    if samples.is_empty() {
        return result;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let len = sorted.len();
    result.count = len;
    result.min = sorted[0];
    result.max = sorted[len - 1];
    result.mean = sorted.iter().sum::<f64>() / len as f64;
    result.p50 = percentile(&sorted, 0.50);
    result.p95 = percentile(&sorted, 0.95);
    result.p99 = percentile(&sorted, 0.99);
    result
}

/// Calculate percentile from sorted values using linear interpolation
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let idx = p * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_basic() {
        let result = summarize(&[10.0, 30.0, 20.0], 3, 1000.0);

        assert_eq!(result.count, 3);
        assert_eq!(result.min, 10.0);
        assert_eq!(result.max, 30.0);
        assert!((result.mean - 20.0).abs() < f64::EPSILON);
        assert!((result.p50 - 20.0).abs() < f64::EPSILON);
        assert!((result.messages_per_second - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summarize_empty() {
        let result = summarize(&[], 0, 1000.0);

        assert_eq!(result.count, 0);
        assert_eq!(result.min, 0.0);
        assert_eq!(result.max, 0.0);
        assert_eq!(result.mean, 0.0);
        assert_eq!(result.messages_per_second, 0.0);
    }

    #[test]
    fn test_summarize_zero_duration() {
        let result = summarize(&[5.0], 1, 0.0);

        assert_eq!(result.count, 1);
        assert_eq!(result.messages_per_second, 0.0);
        assert!(result.messages_per_second.is_finite());
    }

    #[test]
    fn test_summarize_permutation_invariant() {
        let a = summarize(&[4.0, 1.0, 9.0, 7.0, 2.5], 5, 250.0);
        let b = summarize(&[9.0, 2.5, 7.0, 1.0, 4.0], 5, 250.0);
        let c = summarize(&[1.0, 2.5, 4.0, 7.0, 9.0], 5, 250.0);

        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_summarize_throughput_uses_processed_count() {
        // Publish runs have no latency samples but still report throughput.
        let result = summarize(&[], 500, 2000.0);
        assert_eq!(result.count, 0);
        assert!((result.messages_per_second - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentile_calculation() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let result = summarize(&values, 10, 1000.0);

        assert_eq!(result.min, 1.0);
        assert_eq!(result.max, 10.0);
        assert!((result.p50 - 5.5).abs() < 0.01);
        assert!((result.mean - 5.5).abs() < 0.01);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[42.0], 0.99), 42.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_send_error_rate() {
        let result = RunResult::default().with_tally(RunTally {
            messages_sent: 8,
            send_failures: 2,
            ..Default::default()
        });
        assert!((result.send_error_rate() - 0.2).abs() < 0.001);
        assert_eq!(RunResult::default().send_error_rate(), 0.0);
    }

    #[test]
    fn test_run_result_serialization() {
        let result = summarize(&[1.0, 2.0], 2, 100.0);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"count\":2"));
        assert!(json.contains("\"messages_per_second\""));
        assert!(json.contains("\"send_failures\":0"));
    }
}
