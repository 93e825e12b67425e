//! Benchmark message payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latency of a single delivered message in milliseconds
pub type LatencySample = f64;

/// Payload stamped by a pacer at send time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Topic the owning publication was created on (may contain a wildcard)
    pub publication_topic: String,

    /// Run-wide sequence number, starting at 1
    pub sequence: u64,

    /// Send timestamp embedded in the payload
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(publication_topic: impl Into<String>, sequence: u64) -> Self {
        Self {
            publication_topic: publication_topic.into(),
            sequence,
            sent_at: Utc::now(),
        }
    }
}

/// A message delivered to a subscription
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// Concrete topic the message was published on
    pub topic: String,

    /// Decoded payload
    pub message: Message,

    /// Local receive timestamp
    pub received_at: DateTime<Utc>,
}

impl ReceivedMessage {
    /// Wrap a payload received now
    pub fn new(topic: impl Into<String>, message: Message) -> Self {
        Self {
            topic: topic.into(),
            message,
            received_at: Utc::now(),
        }
    }

    /// Receive time minus embedded send time, in milliseconds
    ///
    /// Clock skew between sender and receiver can make this negative; the
    /// value is reported as measured.
    pub fn latency_ms(&self) -> LatencySample {
        let delta = self.received_at - self.message.sent_at;
        delta
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or_else(|| delta.num_milliseconds() as f64)
    }
}
