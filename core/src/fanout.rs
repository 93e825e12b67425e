//! Concurrent resource creation and teardown with a completion barrier
//!
//! Every attempt is dispatched at once. Results land in the slot of the topic
//! that produced them, so output order always matches input order no matter
//! which attempt finishes first. The job completes once every attempt has
//! reported, successful or not.

use crate::events::{EventSink, ResourceKind, RunEvent};
use crate::traits::BrokerError;

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Creation or teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Creating resources
    Create,
    /// Stopping resources
    Teardown,
}

/// Index-addressed result slots plus a completion counter
#[derive(Debug)]
pub struct FanoutJob<T> {
    slots: Vec<Option<T>>,
    completed: usize,
    failed: usize,
}

impl<T> FanoutJob<T> {
    /// Job over `len` attempts
    pub fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self {
            slots,
            completed: 0,
            failed: 0,
        }
    }

    /// Number of attempts
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the job has no attempts
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of attempts that have reported
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Number of attempts that failed
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Whether every attempt has reported
    pub fn is_complete(&self) -> bool {
        self.completed == self.slots.len()
    }

    /// Record the outcome of attempt `index`
    pub fn record(&mut self, index: usize, outcome: Option<T>) {
        if outcome.is_none() {
            self.failed += 1;
        }
        self.slots[index] = outcome;
        self.completed += 1;
    }

    /// Consume the job, returning slots in input order
    pub fn into_slots(self) -> Vec<Option<T>> {
        self.slots
    }
}

/// Run `op` for every topic concurrently and collect the outcomes by index
///
/// A failed attempt leaves `None` in its slot and emits a per-topic event;
/// the remaining attempts are unaffected.
pub async fn fanout<T, F, Fut>(
    kind: ResourceKind,
    phase: Phase,
    topics: &[String],
    op: F,
    events: &EventSink,
) -> Vec<Option<T>>
where
    F: Fn(usize, &str) -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut job = FanoutJob::new(topics.len());
    if job.is_empty() {
        return job.into_slots();
    }

    let mut pending: FuturesUnordered<_> = topics
        .iter()
        .enumerate()
        .map(|(index, topic)| {
            let attempt = op(index, topic.as_str());
            async move { (index, attempt.await) }
        })
        .collect();

    while let Some((index, result)) = pending.next().await {
        let topic = &topics[index];
        let outcome = match result {
            Ok(handle) => {
                report_success(kind, phase, index, topic, events);
                Some(handle)
            }
            Err(e) => {
                report_failure(kind, phase, index, topic, &e, events);
                None
            }
        };
        job.record(index, outcome);
    }

    debug_assert!(job.is_complete());
    tracing::debug!(
        kind = %kind,
        phase = ?phase,
        total = job.len(),
        failed = job.failed(),
        "Fanout complete"
    );

    job.into_slots()
}

fn report_success(kind: ResourceKind, phase: Phase, index: usize, topic: &str, events: &EventSink) {
    let topic = topic.to_string();
    match phase {
        Phase::Create => {
            tracing::info!(kind = %kind, index, topic = %topic, "Created resource");
            events.emit(RunEvent::ResourceCreated { kind, index, topic });
        }
        Phase::Teardown => {
            tracing::debug!(kind = %kind, topic = %topic, "Stopped resource");
            events.emit(RunEvent::ResourceStopped { kind, topic });
        }
    }
}

fn report_failure(
    kind: ResourceKind,
    phase: Phase,
    index: usize,
    topic: &str,
    error: &BrokerError,
    events: &EventSink,
) {
    let topic = topic.to_string();
    let error = error.to_string();
    match phase {
        Phase::Create => {
            tracing::warn!(
                kind = %kind,
                index,
                topic = %topic,
                error = %error,
                "Error creating resource"
            );
            events.emit(RunEvent::ResourceFailed {
                kind,
                index,
                topic,
                error,
            });
        }
        Phase::Teardown => {
            tracing::warn!(kind = %kind, topic = %topic, error = %error, "Error stopping resource");
            events.emit(RunEvent::TeardownFailed { kind, topic, error });
        }
    }
}
