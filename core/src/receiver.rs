//! Per-subscription receive loop

use crate::config::AckMode;
use crate::error::{BenchError, BenchResult};
use crate::message::LatencySample;
use crate::traits::Subscription;

use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// What one receiver observed
#[derive(Debug, Default, Clone)]
pub struct ReceiverStats {
    /// Messages delivered
    pub received: u64,

    /// Manual acknowledgments that failed
    pub ack_failures: u64,

    /// Per-message latency in milliseconds, in arrival order
    pub samples: Vec<LatencySample>,

    /// First delivery
    pub first_at: Option<Instant>,

    /// Last delivery
    pub last_at: Option<Instant>,
}

impl ReceiverStats {
    /// Record one delivery
    pub fn record(&mut self, latency: LatencySample) {
        let now = Instant::now();
        self.first_at.get_or_insert(now);
        self.last_at = Some(now);
        self.received += 1;
        self.samples.push(latency);
    }

    /// Time between first and last delivery
    pub fn span(&self) -> Duration {
        match (self.first_at, self.last_at) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        }
    }

    /// Merge another receiver's observations
    pub fn merge(&mut self, other: ReceiverStats) {
        self.received += other.received;
        self.ack_failures += other.ack_failures;
        self.samples.extend(other.samples);
        self.first_at = match (self.first_at, other.first_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_at = match (self.last_at, other.last_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Consumes one subscription's message stream
pub struct Receiver {
    id: usize,
    subscription: Arc<dyn Subscription>,
    ack_mode: AckMode,
    target: Option<u64>,
}

impl Receiver {
    /// Receiver for `subscription`
    pub fn new(id: usize, subscription: Arc<dyn Subscription>, ack_mode: AckMode) -> Self {
        Self {
            id,
            subscription,
            ack_mode,
            target: None,
        }
    }

    /// Stop after `count` messages
    pub fn with_target(mut self, count: u64) -> Self {
        self.target = Some(count);
        self
    }

    /// Receive until `stop` fires, the stream ends, or the target is reached
    ///
    /// # Errors
    /// Fails if the subscription's stream was already taken.
    pub async fn run(self, mut stop: broadcast::Receiver<()>) -> BenchResult<ReceiverStats> {
        let topic = self.subscription.topic().to_string();
        let mut messages = self.subscription.take_messages().ok_or_else(|| {
            BenchError::orchestration(format!("message stream for {topic} already taken"))
        })?;

        let mut stats = ReceiverStats::default();
        tracing::debug!(
            receiver_id = self.id,
            topic = %topic,
            qos = %self.subscription.qos(),
            "Receiver started"
        );

        while !self.target_reached(&stats) {
            tokio::select! {
                biased;

                _ = stop.recv() => {
                    tracing::debug!(receiver_id = self.id, "Receiver received stop signal");
                    break;
                }

                next = messages.next() => {
                    let Some(delivered) = next else {
                        tracing::debug!(receiver_id = self.id, "Message stream ended");
                        break;
                    };
                    stats.record(delivered.latency_ms());

                    if self.ack_mode == AckMode::Manual {
                        if let Err(e) = self.subscription.ack(&delivered).await {
                            stats.ack_failures += 1;
                            tracing::warn!(
                                receiver_id = self.id,
                                topic = %delivered.topic,
                                error = %e,
                                "Ack failed"
                            );
                        }
                    }
                }
            }
        }

        tracing::debug!(
            receiver_id = self.id,
            topic = %topic,
            received = stats.received,
            ack_failures = stats.ack_failures,
            "Receiver finished"
        );
        Ok(stats)
    }

    fn target_reached(&self, stats: &ReceiverStats) -> bool {
        self.target.is_some_and(|target| stats.received >= target)
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("topic", &self.subscription.topic())
            .field("ack_mode", &self.ack_mode)
            .field("target", &self.target)
            .finish()
    }
}
