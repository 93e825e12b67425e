//! Burst pacer: rate-paced message generation for one publication
//!
//! Each Pacer is a tokio task that repeats a simple cycle:
//! **burst -> delay -> repeat** until its stop condition is met or the run's
//! stop signal fires.
//!
//! 1. Sends `burst_size` messages back-to-back, each stamped with its send
//!    time and routed round-robin across the wildcard leaves
//! 2. Every send is spawned and counted as outstanding until it completes
//! 3. Waits `delay` before the next burst
//! 4. On stop, finishes the current burst, drains outstanding sends, then
//!    releases its live registration
//!
//! Lifecycle is `Running -> Stopping -> Draining -> Done`, observable via
//! [`Pacer::state`].
//!
//! # Example
//!
//! ```ignore
//! use pubsub_bench_core::pacer::{PacerBuilder, PacerState};
//! use pubsub_bench_core::StopCondition;
//!
//! let pacer = PacerBuilder::new(0)
//!     .publication(publication)
//!     .stop_condition(StopCondition::Cycles(10))
//!     .build()?;
//!
//! let stats = pacer.run(stop_rx).await?;
//! println!("Sent: {}", stats.sent);
//! ```

mod builder;
mod executor;
mod rate_limiter;
mod stats;

pub use builder::PacerBuilder;
pub use executor::{Pacer, PacerState};
pub use rate_limiter::{send_period, SendRateLimiter};
pub use stats::{PacerStats, SendTally};
