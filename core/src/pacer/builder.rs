//! Builder pattern for Pacer construction

use crate::config::PacerConfig;
use crate::counter::InFlightCounter;
use crate::error::{BenchError, BenchResult};
use crate::events::EventSink;
use crate::topic::TopicCycle;
use crate::traits::{Publication, StopCondition};

use super::executor::Pacer;
use super::rate_limiter::SendRateLimiter;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Builder for creating Pacer instances
///
/// # Example
/// ```ignore
/// let pacer = PacerBuilder::new(0)
///     .publication(publication)
///     .routes(TopicCycle::new("TEST.BULK.*", 4, 0))
///     .config(&PacerConfig::default())
///     .stop_condition(StopCondition::Cycles(100))
///     .outstanding(outstanding.clone())
///     .live_pacers(live.clone())
///     .build()?;
/// ```
pub struct PacerBuilder {
    id: usize,
    publication: Option<Arc<dyn Publication>>,
    routes: Option<TopicCycle>,
    config: PacerConfig,
    stop_condition: Option<StopCondition>,
    outstanding: Option<InFlightCounter>,
    live_pacers: Option<InFlightCounter>,
    sequence: Option<Arc<AtomicU64>>,
    events: EventSink,
}

impl PacerBuilder {
    /// Create a new builder with the given pacer ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            publication: None,
            routes: None,
            config: PacerConfig::default(),
            stop_condition: None,
            outstanding: None,
            live_pacers: None,
            sequence: None,
            events: EventSink::disabled(),
        }
    }

    /// Set the publication to send through
    pub fn publication(mut self, publication: Arc<dyn Publication>) -> Self {
        self.publication = Some(publication);
        self
    }

    /// Route sends across wildcard leaves (defaults to the publication topic)
    pub fn routes(mut self, routes: TopicCycle) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Apply burst, delay, rate and backpressure settings
    pub fn config(mut self, config: &PacerConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = Some(condition);
        self
    }

    /// Share an outstanding-send counter (defaults to a private one)
    pub fn outstanding(mut self, counter: InFlightCounter) -> Self {
        self.outstanding = Some(counter);
        self
    }

    /// Register with a live-pacer counter until the pacer reaches `Done`
    pub fn live_pacers(mut self, counter: InFlightCounter) -> Self {
        self.live_pacers = Some(counter);
        self
    }

    /// Share a message sequence counter across pacers
    pub fn sequence(mut self, sequence: Arc<AtomicU64>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the diagnostic event sink
    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Build the Pacer
    ///
    /// # Errors
    /// Returns an error if the publication or stop condition is missing, the
    /// burst size is zero, or the rate limit is too small to schedule.
    pub fn build(self) -> BenchResult<Pacer> {
        let publication = self
            .publication
            .ok_or_else(|| BenchError::missing_config("publication"))?;
        let stop_condition = self
            .stop_condition
            .ok_or_else(|| BenchError::missing_config("stop_condition"))?;

        if self.config.burst_size == 0 {
            return Err(BenchError::config("burst size must be at least 1"));
        }

        let rate_limiter = SendRateLimiter::new(self.config.rate_limit)?;
        let routes = self
            .routes
            .unwrap_or_else(|| TopicCycle::new(publication.topic(), 0, 0));
        let registration = self.live_pacers.map(|live| live.track());

        Ok(Pacer::new(
            self.id,
            publication,
            routes,
            self.config.burst_size,
            self.config.delay,
            rate_limiter,
            self.config.max_outstanding,
            self.config.drain_poll_interval,
            stop_condition,
            self.outstanding.unwrap_or_default(),
            registration,
            self.sequence.unwrap_or_default(),
            self.events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_missing_publication() {
        let result = PacerBuilder::new(0)
            .stop_condition(StopCondition::Cycles(1))
            .build();

        let err = result.unwrap_err();
        assert!(err.message.contains("publication"));
    }

    #[tokio::test]
    async fn test_builder_missing_stop_condition() {
        let publication = crate::testing::MockBroker::new().publication("T").await;
        let err = PacerBuilder::new(0)
            .publication(publication)
            .build()
            .unwrap_err();

        assert!(err.message.contains("stop_condition"));
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_burst() {
        let publication = crate::testing::MockBroker::new().publication("T").await;
        let config = PacerConfig {
            burst_size: 0,
            ..Default::default()
        };
        let result = PacerBuilder::new(0)
            .publication(publication)
            .config(&config)
            .stop_condition(StopCondition::Indefinite)
            .build();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_rejects_unschedulable_rate_without_registering() {
        let publication = crate::testing::MockBroker::new().publication("T").await;
        let live = InFlightCounter::new();
        let config = PacerConfig {
            rate_limit: Some(1e-20),
            ..Default::default()
        };

        let err = PacerBuilder::new(0)
            .publication(publication)
            .config(&config)
            .stop_condition(StopCondition::Indefinite)
            .live_pacers(live.clone())
            .build()
            .unwrap_err();

        assert!(err.message.contains("too small"));
        assert!(live.is_idle());
    }

    #[tokio::test]
    async fn test_builder_registers_live_pacer() {
        let publication = crate::testing::MockBroker::new().publication("T").await;
        let live = InFlightCounter::new();

        let pacer = PacerBuilder::new(3)
            .publication(publication)
            .stop_condition(StopCondition::Cycles(1))
            .live_pacers(live.clone())
            .build()
            .unwrap();

        assert_eq!(pacer.id(), 3);
        assert_eq!(live.get(), 1);
        drop(pacer);
        assert!(live.is_idle());
    }
}
