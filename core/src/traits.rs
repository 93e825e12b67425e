//! Broker client traits
//!
//! The orchestration engine never speaks a wire protocol itself. A broker
//! client crate (see `pubsub-bench-broker`) implements these traits and the
//! engine drives them.

use crate::config::{ConnectConfig, Qos, SubscriptionOptions};
use crate::message::{Message, ReceivedMessage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Broker Client Traits
// ============================================================================

/// Infinite, non-restartable stream of messages delivered to a subscription
pub type MessageStream = Pin<Box<dyn Stream<Item = ReceivedMessage> + Send>>;

/// Entry point of a broker client implementation
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Client identifier (e.g., "loopback")
    fn name(&self) -> &str;

    /// Establish a session
    async fn connect(&self, config: &ConnectConfig) -> Result<Arc<dyn Session>, BrokerError>;
}

/// An authenticated broker session
#[async_trait]
pub trait Session: Send + Sync {
    /// Create a publication on `topic`
    async fn create_publication(&self, topic: &str)
        -> Result<Arc<dyn Publication>, BrokerError>;

    /// Create a subscription on `topic`
    async fn create_subscription(
        &self,
        topic: &str,
        options: &SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError>;

    /// Close the session
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A topic-scoped broker resource that can be torn down
#[async_trait]
pub trait Resource: Send + Sync {
    /// Topic the resource was created on
    fn topic(&self) -> &str;

    /// Stop the resource and release its broker-side state
    async fn stop(&self) -> Result<(), BrokerError>;
}

/// A publication handle
#[async_trait]
pub trait Publication: Resource {
    /// Send `message` on `topic`
    ///
    /// `topic` may differ from [`Resource::topic`] when the publication was
    /// created on a wildcard pattern.
    async fn send(&self, topic: &str, message: Message) -> Result<(), BrokerError>;
}

/// A subscription handle
#[async_trait]
pub trait Subscription: Resource {
    /// Quality of service granted by the broker
    fn qos(&self) -> Qos;

    /// Take the message stream
    ///
    /// Returns `None` once the stream has already been taken.
    fn take_messages(&self) -> Option<MessageStream>;

    /// Acknowledge a message (manual ack mode)
    async fn ack(&self, message: &ReceivedMessage) -> Result<(), BrokerError>;
}

/// Broker client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Could not reach the broker
    #[error("connection failed: {0}")]
    Connection(String),

    /// Credentials rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Broker refused a publication or subscription
    #[error("rejected on {topic}: {reason}")]
    Rejected {
        /// Topic of the refused resource
        topic: String,
        /// Broker-supplied reason
        reason: String,
    },

    /// Message could not be sent
    #[error("send failed: {0}")]
    Send(String),

    /// Operation on a closed session or stopped resource
    #[error("session or resource already closed")]
    Closed,

    /// Anything else reported by the client
    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Convert to ErrorKind for error classification
    pub fn to_error_kind(&self) -> crate::ErrorKind {
        match self {
            BrokerError::Connection(_) | BrokerError::Auth(_) => crate::ErrorKind::Connect,
            BrokerError::Rejected { .. } => crate::ErrorKind::Resource,
            BrokerError::Send(_) => crate::ErrorKind::Send,
            BrokerError::Closed => crate::ErrorKind::Session,
            BrokerError::Other(_) => crate::ErrorKind::Session,
        }
    }
}

// ============================================================================
// Stop Condition
// ============================================================================

/// When a test window (or a single pacer) stops issuing new bursts
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StopCondition {
    /// Run for the specified duration
    Duration(Duration),

    /// Run exactly N burst cycles per pacer
    Cycles(usize),

    /// Run until explicitly stopped (Ctrl+C)
    Indefinite,
}

impl Default for StopCondition {
    fn default() -> Self {
        StopCondition::Duration(Duration::from_secs(30))
    }
}
