//! Pacer send loop

use crate::counter::{InFlightCounter, InFlightGuard};
use crate::error::BenchResult;
use crate::events::{EventSink, RunEvent};
use crate::message::Message;
use crate::topic::TopicCycle;
use crate::traits::{Publication, StopCondition};

use super::rate_limiter::SendRateLimiter;
use super::stats::{PacerStats, SendTally};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Pacer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    /// Sending bursts
    Running,
    /// Stop requested; the current burst is finishing
    Stopping,
    /// Waiting for outstanding sends to complete
    Draining,
    /// Finished; live registration released
    Done,
}

/// Drives one publication: a burst of sends, a delay, repeat
///
/// Sends are dispatched as spawned tasks and tracked by the outstanding
/// counter, so a slow broker never blocks the burst itself.
pub struct Pacer {
    id: usize,
    publication: Arc<dyn Publication>,
    topics: TopicCycle,
    burst_size: usize,
    delay: Duration,
    rate_limiter: SendRateLimiter,
    max_outstanding: Option<usize>,
    drain_poll_interval: Duration,
    stop_condition: StopCondition,
    outstanding: InFlightCounter,
    registration: Option<InFlightGuard>,
    sequence: Arc<AtomicU64>,
    tally: Arc<SendTally>,
    events: EventSink,
    state_tx: watch::Sender<PacerState>,
}

impl Pacer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: usize,
        publication: Arc<dyn Publication>,
        topics: TopicCycle,
        burst_size: usize,
        delay: Duration,
        rate_limiter: SendRateLimiter,
        max_outstanding: Option<usize>,
        drain_poll_interval: Duration,
        stop_condition: StopCondition,
        outstanding: InFlightCounter,
        registration: Option<InFlightGuard>,
        sequence: Arc<AtomicU64>,
        events: EventSink,
    ) -> Self {
        let (state_tx, _) = watch::channel(PacerState::Running);
        Self {
            id,
            publication,
            topics,
            burst_size,
            delay,
            rate_limiter,
            max_outstanding,
            drain_poll_interval,
            stop_condition,
            outstanding,
            registration,
            sequence,
            tally: Arc::new(SendTally::new()),
            events,
            state_tx,
        }
    }

    /// Get the pacer ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Watch the pacer's lifecycle state
    pub fn state(&self) -> watch::Receiver<PacerState> {
        self.state_tx.subscribe()
    }

    /// Live send counters, readable while the pacer runs
    pub fn tally(&self) -> Arc<SendTally> {
        Arc::clone(&self.tally)
    }

    /// Run until the stop condition is met or `stop` fires
    ///
    /// Returns after every dispatched send has completed.
    pub async fn run(mut self, mut stop: broadcast::Receiver<()>) -> BenchResult<PacerStats> {
        let mut stats = PacerStats::new();
        stats.start();

        tracing::debug!(
            pacer_id = self.id,
            topic = %self.publication.topic(),
            burst_size = self.burst_size,
            delay_ms = self.delay.as_millis() as u64,
            "Pacer started"
        );

        loop {
            if self.should_stop(&stats) || stop_requested(&mut stop) {
                break;
            }

            self.topics.restart();
            for _ in 0..self.burst_size {
                self.rate_limiter.wait().await;
                if let Some(limit) = self.max_outstanding {
                    self.outstanding
                        .wait_below(limit, self.drain_poll_interval)
                        .await;
                }
                self.dispatch();
            }
            stats.cycles += 1;

            if self.should_stop(&stats) {
                break;
            }

            tokio::select! {
                biased;

                _ = stop.recv() => {
                    tracing::debug!(pacer_id = self.id, "Pacer received stop signal");
                    break;
                }

                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        self.set_state(PacerState::Stopping);
        tracing::debug!(
            pacer_id = self.id,
            cycles = stats.cycles,
            outstanding = self.outstanding.get(),
            "Pacer stopping"
        );

        self.set_state(PacerState::Draining);
        self.outstanding.wait_idle(self.drain_poll_interval).await;

        stats.absorb(&self.tally);
        stats.stop();

        self.set_state(PacerState::Done);
        if let Some(registration) = self.registration.take() {
            registration.release();
        }

        tracing::debug!(
            pacer_id = self.id,
            issued = stats.issued,
            sent = stats.sent,
            failed = stats.failed,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Pacer finished"
        );

        Ok(stats)
    }

    /// Stamp, route and dispatch one message
    fn dispatch(&mut self) {
        let topic = self.topics.next_topic();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message = Message::new(self.publication.topic(), sequence);

        let guard = self.outstanding.track();
        self.tally.record_issued();

        let publication = Arc::clone(&self.publication);
        let tally = Arc::clone(&self.tally);
        let events = self.events.clone();
        let pacer_id = self.id;

        tokio::spawn(async move {
            match publication.send(&topic, message).await {
                Ok(()) => tally.record_sent(),
                Err(e) => {
                    tally.record_failed();
                    tracing::warn!(pacer_id, topic = %topic, error = %e, "Send failed");
                    events.emit(RunEvent::SendFailed {
                        topic,
                        error: e.to_string(),
                    });
                }
            }
            // Counted before release so a drained pacer sees final tallies.
            drop(guard);
        });
    }

    fn should_stop(&self, stats: &PacerStats) -> bool {
        match &self.stop_condition {
            StopCondition::Cycles(n) => stats.cycles >= *n,
            StopCondition::Duration(duration) => stats
                .started_at
                .map(|start| start.elapsed() >= *duration)
                .unwrap_or(false),
            StopCondition::Indefinite => false,
        }
    }

    fn set_state(&self, state: PacerState) {
        self.state_tx.send_replace(state);
    }
}

/// Non-blocking check of the stop signal; a closed channel counts as a stop
fn stop_requested(stop: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        stop.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("id", &self.id)
            .field("topic", &self.publication.topic())
            .field("routes", &self.topics)
            .field("burst_size", &self.burst_size)
            .field("delay", &self.delay)
            .field("rate_limiter", &self.rate_limiter)
            .field("stop_condition", &self.stop_condition)
            .finish()
    }
}
