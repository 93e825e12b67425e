//! pubsub-bench-broker: broker client implementations
//!
//! Provides [`LoopbackBroker`], an in-process bus implementing the
//! `pubsub-bench-core` broker traits. It supports `*` and `>` wildcard
//! subscriptions, optional credentials, and a configurable send latency.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod loopback;

pub use loopback::{topic_matches, LoopbackBroker, MULTI_LEVEL, SINGLE_LEVEL};
