//! pubsub-bench-core: test-orchestration engine for pub/sub load testing
//!
//! This crate drives a message bus through a benchmark run without speaking
//! any wire protocol itself:
//!
//! - Broker client traits (`BrokerClient`, `Session`, `Publication`, `Subscription`)
//! - Wildcard topic expansion
//! - Concurrent resource creation and teardown with a completion barrier
//! - Burst pacing with outstanding-send tracking
//! - Coordinated shutdown
//! - Latency and throughput statistics
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod counter;
pub mod error;
pub mod events;
pub mod fanout;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod pacer;
pub mod receiver;
pub mod shutdown;
pub mod topic;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::ChannelConfig;
pub use config::*;
pub use counter::{InFlightCounter, InFlightGuard};
pub use error::*;
pub use events::{EventSink, ResourceKind, RunEvent};
pub use message::*;
pub use metrics::*;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use pacer::{Pacer, PacerBuilder, PacerState, PacerStats};
pub use shutdown::{Measurement, ResourceSet, ShutdownCoordinator};
pub use traits::*;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::time::Duration;

    // =========================================================================
    // Round-trip serialization tests
    // =========================================================================

    #[test]
    fn test_run_config_roundtrip() {
        let config = RunConfig::new(RunMode::Subscribe)
            .with_topics(["A.*", "B"])
            .with_wildcard(4, 2)
            .with_stop_condition(StopCondition::Cycles(3))
            .with_subscription(SubscriptionOptions {
                qos: Qos::GuaranteedDelivery,
                name: Some("durable".into()),
                ack_mode: AckMode::Manual,
            });
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RunConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.mode, RunMode::Subscribe);
        assert_eq!(deserialized.topics, config.topics);
        assert_eq!(deserialized.wildcard, config.wildcard);
        assert_eq!(deserialized.stop_condition, StopCondition::Cycles(3));
        assert_eq!(deserialized.subscription, config.subscription);
    }

    #[test]
    fn test_stop_condition_roundtrip() {
        for stop in [
            StopCondition::Duration(Duration::from_millis(1500)),
            StopCondition::Cycles(7),
            StopCondition::Indefinite,
        ] {
            let json = serde_json::to_string(&stop).unwrap();
            let deserialized: StopCondition = serde_json::from_str(&json).unwrap();
            assert_eq!(deserialized, stop);
        }
    }

    #[test]
    fn test_error_kind_roundtrip() {
        for kind in [
            ErrorKind::Config,
            ErrorKind::Connect,
            ErrorKind::Resource,
            ErrorKind::Send,
            ErrorKind::Session,
            ErrorKind::Invariant,
            ErrorKind::Orchestration,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let deserialized: ErrorKind = serde_json::from_str(&json).unwrap();
            assert_eq!(deserialized, kind);
        }
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::new("TEST.BULK.*", 42);
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, msg);
    }

    // =========================================================================
    // JSON format tests
    // =========================================================================

    #[test]
    fn test_qos_wire_codes() {
        assert_eq!(serde_json::to_string(&Qos::BestEffort).unwrap(), "\"BE\"");
        assert_eq!(
            serde_json::to_string(&Qos::GuaranteedConnection).unwrap(),
            "\"GC\""
        );
        assert_eq!(
            serde_json::to_string(&Qos::GuaranteedDelivery).unwrap(),
            "\"GD\""
        );
    }

    #[test]
    fn test_run_mode_snake_case_serialization() {
        assert_eq!(serde_json::to_string(&RunMode::Ping).unwrap(), "\"ping\"");
        assert_eq!(
            serde_json::to_string(&RunMode::Subscribe).unwrap(),
            "\"subscribe\""
        );
    }

    #[test]
    fn test_skip_serializing_if_works() {
        let json = serde_json::to_string(&PacerConfig::default()).unwrap();

        assert!(!json.contains("rate_limit"));
        assert!(!json.contains("max_outstanding"));
        assert!(json.contains("\"burst_size\":10"));
    }

    #[test]
    fn test_run_result_fields() {
        let result = summarize(&[10.0, 30.0, 20.0], 3, 1000.0);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["count"], 3);
        assert_eq!(json["min"], 10.0);
        assert_eq!(json["max"], 30.0);
        assert_eq!(json["mean"], 20.0);
        assert_eq!(json["tally"]["resources_requested"], 0);
    }

    // =========================================================================
    // Cross-module behavior
    // =========================================================================

    #[tokio::test]
    async fn test_end_to_end_two_topics_with_failures() {
        let broker = testing::MockBroker::new().fail_every_nth_send(3);
        let config = RunConfig::new(RunMode::Publish)
            .with_topics(["A", "B"])
            .with_wildcard(0, 0)
            .with_burst(3, Duration::ZERO)
            .with_stop_condition(StopCondition::Cycles(2));
        let (orchestrator, _events) = OrchestratorBuilder::new()
            .config(config)
            .broker(broker.client())
            .build()
            .unwrap();

        let result = orchestrator.run().await.unwrap();

        assert_eq!(result.tally.messages_issued, 12);
        assert_eq!(result.tally.send_failures, 4);
        assert_eq!(result.tally.messages_sent, 8);
        assert_eq!(broker.log().send_attempts.load(std::sync::atomic::Ordering::SeqCst), 12);
        assert_eq!(broker.log().closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
