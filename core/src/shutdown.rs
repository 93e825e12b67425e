//! Coordinated teardown of every resource in a run
//!
//! Teardown never starts while a pacer is still sending, resources are
//! stopped concurrently, and the session is closed only after every stop
//! attempt has reported.

use crate::counter::InFlightCounter;
use crate::events::{EventSink, ResourceKind, RunEvent};
use crate::fanout::{fanout, Phase};
use crate::message::LatencySample;
use crate::metrics::{summarize, RunResult, RunTally};
use crate::traits::{Publication, Resource, Session, Subscription};

use std::sync::Arc;
use std::time::Duration;

/// Handles produced by a creation fanout, with their topics
pub enum ResourceSet {
    /// Publication handles
    Publications {
        /// Topic per slot
        topics: Vec<String>,
        /// `None` where creation failed
        handles: Vec<Option<Arc<dyn Publication>>>,
    },
    /// Subscription handles
    Subscriptions {
        /// Topic per slot
        topics: Vec<String>,
        /// `None` where creation failed
        handles: Vec<Option<Arc<dyn Subscription>>>,
    },
}

impl ResourceSet {
    /// Number of slots, present or not
    pub fn len(&self) -> usize {
        match self {
            ResourceSet::Publications { handles, .. } => handles.len(),
            ResourceSet::Subscriptions { handles, .. } => handles.len(),
        }
    }

    /// Whether the set has no slots
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw measurements handed to statistics once the run is over
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    /// Latency samples
    pub samples: Vec<LatencySample>,
    /// Messages counted toward throughput
    pub messages_processed: u64,
    /// Measured window in milliseconds
    pub duration_ms: f64,
    /// Counters gathered so far
    pub tally: RunTally,
}

/// Tears down resources and closes the session
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    live_pacers: InFlightCounter,
    poll_interval: Duration,
    events: EventSink,
}

impl ShutdownCoordinator {
    /// Coordinator gated on `live_pacers`
    pub fn new(live_pacers: InFlightCounter, poll_interval: Duration, events: EventSink) -> Self {
        Self {
            live_pacers,
            poll_interval,
            events,
        }
    }

    /// Wait until every registered pacer has reached `Done`
    pub async fn wait_for_pacers(&self) {
        if !self.live_pacers.is_idle() {
            tracing::debug!(live = self.live_pacers.get(), "Waiting for pacers to finish");
        }
        self.live_pacers.wait_idle(self.poll_interval).await;
    }

    /// Stop every resource set in order, close the session, and summarize
    ///
    /// Sets are torn down one after another; resources within a set are
    /// stopped concurrently. Teardown and close failures are reported but
    /// never alter the latency or throughput figures.
    pub async fn shutdown(
        &self,
        sets: Vec<ResourceSet>,
        session: &dyn Session,
        measurement: Measurement,
    ) -> RunResult {
        self.wait_for_pacers().await;

        let mut teardown_failures = 0;
        for set in sets {
            teardown_failures += match set {
                ResourceSet::Publications { topics, handles } => {
                    self.teardown(ResourceKind::Publication, &topics, handles)
                        .await
                }
                ResourceSet::Subscriptions { topics, handles } => {
                    self.teardown(ResourceKind::Subscription, &topics, handles)
                        .await
                }
            };
        }

        match session.close().await {
            Ok(()) => {
                tracing::info!("Session closed");
                self.events.emit(RunEvent::SessionClosed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error closing session");
                self.events.emit(RunEvent::SessionCloseFailed {
                    error: e.to_string(),
                });
            }
        }
        self.events.emit(RunEvent::ShutdownComplete);

        let mut tally = measurement.tally;
        tally.teardown_failures += teardown_failures;

        summarize(
            &measurement.samples,
            measurement.messages_processed,
            measurement.duration_ms,
        )
        .with_tally(tally)
    }

    /// Stop the present handles concurrently, returning the failure count
    ///
    /// Absent handles are skipped and count as complete.
    pub async fn teardown<R>(
        &self,
        kind: ResourceKind,
        topics: &[String],
        handles: Vec<Option<Arc<R>>>,
    ) -> usize
    where
        R: Resource + ?Sized,
    {
        let (present_topics, present): (Vec<String>, Vec<Arc<R>>) = topics
            .iter()
            .zip(handles)
            .filter_map(|(topic, handle)| handle.map(|h| (topic.clone(), h)))
            .unzip();

        let outcomes = fanout(
            kind,
            Phase::Teardown,
            &present_topics,
            |index, _| {
                let handle = Arc::clone(&present[index]);
                async move { handle.stop().await }
            },
            &self.events,
        )
        .await;

        outcomes.iter().filter(|o| o.is_none()).count()
    }
}
