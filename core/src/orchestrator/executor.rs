//! Orchestrator execution logic

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{PacerConfig, RunConfig, RunMode, SubscriptionOptions};
use crate::counter::InFlightCounter;
use crate::error::{BenchError, BenchResult};
use crate::events::{EventSink, ResourceKind, RunEvent};
use crate::fanout::{fanout, Phase};
use crate::metrics::{RunResult, RunTally};
use crate::pacer::{PacerBuilder, PacerStats};
use crate::receiver::{Receiver, ReceiverStats};
use crate::shutdown::{Measurement, ResourceSet, ShutdownCoordinator};
use crate::topic::{expand_all, TopicCycle};
use crate::traits::{BrokerClient, Publication, Session, StopCondition, Subscription};

use super::aggregator::aggregate_pacer_stats;

/// Why the test window closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowClose {
    Signal,
    Deadline,
    ParticipantsDone,
}

/// Orchestrator manages the run lifecycle
///
/// Connects, creates resources, drives pacers and receivers through the test
/// window, then hands everything to the shutdown coordinator.
pub struct Orchestrator {
    /// Run configuration
    pub(crate) config: RunConfig,

    /// Broker client
    pub(crate) broker: Arc<dyn BrokerClient>,

    /// Diagnostic events
    pub(crate) events: EventSink,

    /// Stop signal sender
    pub(crate) stop_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(config: RunConfig, broker: Arc<dyn BrokerClient>, events: EventSink) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            config,
            broker,
            events,
            stop_tx,
        }
    }

    /// Get a stop signal receiver
    pub fn stop_receiver(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Close the test window early
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the configured mode
    ///
    /// # Errors
    /// Returns an error if the session cannot be established. Per-resource
    /// and per-message failures are reported in the result's tally instead.
    pub async fn run(&self) -> BenchResult<RunResult> {
        tracing::info!(
            mode = ?self.config.mode,
            broker = self.broker.name(),
            topics = ?self.config.topics,
            stop_condition = ?self.config.stop_condition,
            "Starting run"
        );

        let result = match self.config.mode {
            RunMode::Publish => self.run_publish().await,
            RunMode::Subscribe => self.run_subscribe().await,
            RunMode::Ping => self.run_ping().await,
        }?;

        tracing::info!(
            count = result.count,
            messages_processed = result.messages_processed,
            messages_per_second = result.messages_per_second,
            duration_ms = result.total_duration_ms,
            "Run completed"
        );
        Ok(result)
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Ctrl+C closes the test window; teardown still runs.
    pub async fn run_with_signal_handling(&self) -> BenchResult<RunResult> {
        let stop_tx = self.stop_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, closing test window...");
                    let _ = stop_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;
        signal_handle.abort();
        result
    }

    /// Publish mode: one pacer per publication
    async fn run_publish(&self) -> BenchResult<RunResult> {
        let mut window_rx = self.stop_tx.subscribe();
        let session = self.connect().await?;
        let topics = self.config.topics.clone();

        let handles = self.create_publications(&session, &topics).await;
        let mut tally = creation_tally(&handles);

        let live = InFlightCounter::new();
        let outstanding = InFlightCounter::new();
        let sequence = Arc::new(AtomicU64::new(0));

        let mut tasks = Vec::new();
        for (id, (topic, publication)) in topics.iter().zip(&handles).enumerate() {
            let Some(publication) = publication else {
                continue;
            };
            let pacer = PacerBuilder::new(id)
                .publication(Arc::clone(publication))
                .routes(TopicCycle::new(
                    topic.as_str(),
                    self.config.wildcard.count,
                    self.config.wildcard.start,
                ))
                .config(&self.config.pacer)
                .stop_condition(self.config.stop_condition.clone())
                .outstanding(outstanding.clone())
                .live_pacers(live.clone())
                .sequence(Arc::clone(&sequence))
                .events(self.events.clone())
                .build()?;
            tasks.push(tokio::spawn(pacer.run(self.stop_tx.subscribe())));
        }

        let coordinator = self.coordinator(&live);
        let elapsed = self.test_window(&mut window_rx, tasks.len(), &live).await;
        coordinator.wait_for_pacers().await;

        let aggregated = aggregate_pacer_stats(&join_all("pacer", tasks).await);
        tally.messages_issued = aggregated.total_issued;
        tally.messages_sent = aggregated.total_sent;
        tally.send_failures = aggregated.total_failed;
        tracing::info!(
            pacers = aggregated.total_pacers,
            cycles = aggregated.total_cycles,
            sent = aggregated.total_sent,
            failed = aggregated.total_failed,
            error_rate = aggregated.error_rate(),
            pacer_window_ms = aggregated.total_duration.as_millis() as u64,
            pacer_mps = aggregated.messages_per_second,
            "Publishing finished"
        );

        let measurement = Measurement {
            samples: Vec::new(),
            messages_processed: aggregated.total_sent,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            tally,
        };
        let sets = vec![ResourceSet::Publications { topics, handles }];
        Ok(coordinator
            .shutdown(sets, session.as_ref(), measurement)
            .await)
    }

    /// Subscribe mode: one receiver per subscription
    async fn run_subscribe(&self) -> BenchResult<RunResult> {
        let mut window_rx = self.stop_tx.subscribe();
        let session = self.connect().await?;
        let wildcard = &self.config.wildcard;
        let topics = expand_all(&self.config.topics, wildcard.count, wildcard.start);

        let handles = self
            .create_subscriptions(&session, &topics, &self.config.subscription)
            .await;
        let mut tally = creation_tally(&handles);

        let target = match self.config.stop_condition {
            StopCondition::Cycles(n) => Some(n as u64),
            _ => None,
        };

        let receivers_live = InFlightCounter::new();
        let mut tasks = Vec::new();
        for (id, subscription) in handles.iter().enumerate() {
            let Some(subscription) = subscription else {
                continue;
            };
            let mut receiver =
                Receiver::new(id, Arc::clone(subscription), self.config.subscription.ack_mode);
            if let Some(target) = target {
                receiver = receiver.with_target(target);
            }
            tasks.push(self.spawn_receiver(receiver, &receivers_live));
        }

        let coordinator = self.coordinator(&InFlightCounter::new());
        self.test_window(&mut window_rx, tasks.len(), &receivers_live)
            .await;

        let mut received = ReceiverStats::default();
        for stats in join_all("receiver", tasks).await {
            received.merge(stats);
        }
        tally.messages_received = received.received;
        tally.ack_failures = received.ack_failures;

        let measurement = Measurement {
            messages_processed: received.received,
            duration_ms: received.span().as_secs_f64() * 1000.0,
            samples: received.samples,
            tally,
        };
        let sets = vec![ResourceSet::Subscriptions { topics, handles }];
        Ok(coordinator
            .shutdown(sets, session.as_ref(), measurement)
            .await)
    }

    /// Ping mode: round-trip latency on a single topic
    async fn run_ping(&self) -> BenchResult<RunResult> {
        let mut window_rx = self.stop_tx.subscribe();
        let session = self.connect().await?;
        let topics = vec![self.config.topics[0].clone()];
        let ping = &self.config.ping;

        let subscriptions = self
            .create_subscriptions(&session, &topics, &SubscriptionOptions::default())
            .await;
        // Pings are only published once the subscription exists.
        let pub_topics = if subscriptions[0].is_some() {
            topics.clone()
        } else {
            tracing::warn!(topic = %topics[0], "Ping subscription failed, skipping publication");
            Vec::new()
        };
        let publications = self.create_publications(&session, &pub_topics).await;

        let mut tally = creation_tally(&subscriptions);
        let pub_tally = creation_tally(&publications);
        tally.resources_requested += pub_tally.resources_requested;
        tally.resources_created += pub_tally.resources_created;
        tally.resource_failures += pub_tally.resource_failures;

        let live = InFlightCounter::new();
        let receivers_live = InFlightCounter::new();
        let coordinator = self.coordinator(&live);
        let mut pacer_stats = PacerStats::default();
        let mut received = ReceiverStats::default();

        if let (Some(subscription), Some(Some(publication))) =
            (&subscriptions[0], publications.first())
        {
            let ack_mode = self.config.subscription.ack_mode;
            let receiver = Receiver::new(0, Arc::clone(subscription), ack_mode)
                .with_target(ping.count as u64);
            let receiver_task = self.spawn_receiver(receiver, &receivers_live);

            let pacer_config = PacerConfig {
                burst_size: 1,
                delay: ping.interval,
                rate_limit: None,
                max_outstanding: None,
                drain_poll_interval: self.config.pacer.drain_poll_interval,
            };
            let pacer = PacerBuilder::new(0)
                .publication(Arc::clone(publication))
                .config(&pacer_config)
                .stop_condition(StopCondition::Cycles(ping.count))
                .live_pacers(live.clone())
                .events(self.events.clone())
                .build()?;
            let pacer_task = tokio::spawn(pacer.run(self.stop_tx.subscribe()));
            self.events.emit(RunEvent::TestStarted { participants: 2 });

            let poll = self.config.pacer.drain_poll_interval;
            let grace = ping.receive_grace;
            let close = tokio::select! {
                _ = window_rx.recv() => WindowClose::Signal,
                _ = receivers_live.wait_idle(poll) => WindowClose::ParticipantsDone,
                _ = async {
                    live.wait_idle(poll).await;
                    tokio::time::sleep(grace).await;
                } => WindowClose::Deadline,
            };
            if close == WindowClose::Deadline {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Not every ping came back before the grace period ended"
                );
            }
            self.stop();
            coordinator.wait_for_pacers().await;

            if let Some(stats) = join_all("pacer", vec![pacer_task]).await.pop() {
                pacer_stats = stats;
            }
            if let Some(stats) = join_all("receiver", vec![receiver_task]).await.pop() {
                received = stats;
            }
        } else {
            tracing::warn!(topic = %topics[0], "Ping resources unavailable, skipping test window");
        }

        let duration = match (pacer_stats.started_at, received.last_at) {
            (Some(first_send), Some(last_receive)) => {
                last_receive.saturating_duration_since(first_send)
            }
            _ => Duration::ZERO,
        };
        self.events.emit(RunEvent::TestComplete {
            elapsed_ms: duration.as_secs_f64() * 1000.0,
        });

        tally.messages_issued = pacer_stats.issued;
        tally.messages_sent = pacer_stats.sent;
        tally.send_failures = pacer_stats.failed;
        tally.messages_received = received.received;
        tally.ack_failures = received.ack_failures;

        let measurement = Measurement {
            messages_processed: received.received,
            duration_ms: duration.as_secs_f64() * 1000.0,
            samples: received.samples,
            tally,
        };
        // Publication stops before the subscription.
        let sets = vec![
            ResourceSet::Publications {
                topics: pub_topics,
                handles: publications,
            },
            ResourceSet::Subscriptions {
                topics,
                handles: subscriptions,
            },
        ];
        Ok(coordinator
            .shutdown(sets, session.as_ref(), measurement)
            .await)
    }

    /// Establish the session; failure is fatal
    async fn connect(&self) -> BenchResult<Arc<dyn Session>> {
        let session = self
            .broker
            .connect(&self.config.connect)
            .await
            .map_err(|e| {
                tracing::error!(broker = self.broker.name(), error = %e, "Connect failed");
                BenchError::broker(&e)
            })?;

        tracing::info!(
            broker = self.broker.name(),
            primary = %self.config.connect.primary,
            "Connected"
        );
        self.events.emit(RunEvent::Connected {
            client: self.broker.name().to_string(),
        });
        Ok(session)
    }

    async fn create_publications(
        &self,
        session: &Arc<dyn Session>,
        topics: &[String],
    ) -> Vec<Option<Arc<dyn Publication>>> {
        fanout(
            ResourceKind::Publication,
            Phase::Create,
            topics,
            |_, topic| {
                let session = Arc::clone(session);
                let topic = topic.to_string();
                async move { session.create_publication(&topic).await }
            },
            &self.events,
        )
        .await
    }

    async fn create_subscriptions(
        &self,
        session: &Arc<dyn Session>,
        topics: &[String],
        options: &SubscriptionOptions,
    ) -> Vec<Option<Arc<dyn Subscription>>> {
        fanout(
            ResourceKind::Subscription,
            Phase::Create,
            topics,
            |_, topic| {
                let session = Arc::clone(session);
                let topic = topic.to_string();
                let options = options.clone();
                async move { session.create_subscription(&topic, &options).await }
            },
            &self.events,
        )
        .await
    }

    fn spawn_receiver(
        &self,
        receiver: Receiver,
        live: &InFlightCounter,
    ) -> JoinHandle<BenchResult<ReceiverStats>> {
        let registration = live.track();
        let stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let result = receiver.run(stop_rx).await;
            registration.release();
            result
        })
    }

    fn coordinator(&self, live_pacers: &InFlightCounter) -> ShutdownCoordinator {
        ShutdownCoordinator::new(
            live_pacers.clone(),
            self.config.pacer.drain_poll_interval,
            self.events.clone(),
        )
    }

    /// Hold the test window open, then signal every participant to stop
    ///
    /// The window closes on the stop signal, the configured duration, or
    /// once every participant has finished on its own.
    async fn test_window(
        &self,
        window_rx: &mut broadcast::Receiver<()>,
        participants: usize,
        live: &InFlightCounter,
    ) -> Duration {
        let start = Instant::now();

        if participants == 0 {
            tracing::warn!("No resources were created, skipping test window");
        } else {
            self.events.emit(RunEvent::TestStarted { participants });
            tracing::info!(participants, "Test window open");

            let deadline = match self.config.stop_condition {
                StopCondition::Duration(d) => Some(d),
                _ => None,
            };
            let poll = self.config.pacer.drain_poll_interval;
            let close = tokio::select! {
                _ = window_rx.recv() => WindowClose::Signal,
                _ = sleep_until_deadline(deadline) => WindowClose::Deadline,
                _ = live.wait_idle(poll) => WindowClose::ParticipantsDone,
            };
            tracing::info!(reason = ?close, "Test window closed");
        }

        let elapsed = start.elapsed();
        self.stop();
        self.events.emit(RunEvent::TestComplete {
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        });
        elapsed
    }
}

fn sleep_until_deadline(deadline: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Resource counters after a creation fanout
fn creation_tally<T>(handles: &[Option<T>]) -> RunTally {
    let created = handles.iter().filter(|h| h.is_some()).count();
    RunTally {
        resources_requested: handles.len(),
        resources_created: created,
        resource_failures: handles.len() - created,
        ..Default::default()
    }
}

/// Await every task, keeping the results of those that succeeded
async fn join_all<T>(label: &'static str, handles: Vec<JoinHandle<BenchResult<T>>>) -> Vec<T> {
    let mut results = Vec::with_capacity(handles.len());
    for (idx, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(stats)) => results.push(stats),
            Ok(Err(e)) => {
                tracing::error!(task = label, index = idx, error = %e, "Task returned error");
            }
            Err(e) => {
                tracing::error!(task = label, index = idx, error = %e, "Task panicked");
            }
        }
    }
    results
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("broker", &self.broker.name())
            .finish()
    }
}
