//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::ChannelConfig;
use crate::config::{RunConfig, RunMode};
use crate::error::{BenchError, BenchResult};
use crate::events::{EventSink, RunEvent};
use crate::traits::{BrokerClient, StopCondition};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let (orchestrator, events_rx) = OrchestratorBuilder::new()
///     .mode(RunMode::Publish)
///     .topics(["TEST.BULK.*"])
///     .stop_condition(StopCondition::Cycles(100))
///     .broker(broker)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: RunConfig,
    broker: Option<Arc<dyn BrokerClient>>,
    channel_config: ChannelConfig,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            broker: None,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the run mode
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the topic patterns
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_topics(topics);
        self
    }

    /// Set the stop condition
    pub fn stop_condition(mut self, stop: StopCondition) -> Self {
        self.config.stop_condition = stop;
        self
    }

    /// Set the broker client
    pub fn broker(mut self, broker: Arc<dyn BrokerClient>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the orchestrator and return it along with the event receiver
    ///
    /// # Errors
    ///
    /// Returns an error if the broker is not set, the event buffer is zero,
    /// or configuration validation fails.
    pub fn build(self) -> BenchResult<(Orchestrator, mpsc::Receiver<RunEvent>)> {
        let broker = self
            .broker
            .ok_or_else(|| BenchError::missing_config("broker"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        if self.channel_config.events_buffer == 0 {
            return Err(BenchError::config("event buffer must be at least 1"));
        }

        let (events_tx, events_rx) = mpsc::channel(self.channel_config.events_buffer);

        let orchestrator = Orchestrator::new(self.config, broker, EventSink::new(events_tx));

        Ok((orchestrator, events_rx))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
