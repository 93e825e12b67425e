//! Orchestrator for run lifecycle management
//!
//! The Orchestrator drives a complete run through its stages:
//! - Connecting the session
//! - Creating publications or subscriptions through a concurrent fanout
//! - Spawning pacers and receivers for the test window
//! - Closing the window via broadcast stop signal
//! - Handing every resource to the shutdown coordinator
//!
//! # Example
//!
//! ```ignore
//! use pubsub_bench_core::{OrchestratorBuilder, RunMode, StopCondition};
//!
//! let (orchestrator, events_rx) = OrchestratorBuilder::new()
//!     .mode(RunMode::Publish)
//!     .stop_condition(StopCondition::Duration(Duration::from_secs(30)))
//!     .broker(broker)
//!     .build()?;
//!
//! let result = orchestrator.run_with_signal_handling().await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_pacer_stats, AggregatedStats};
pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
