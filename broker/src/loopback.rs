//! In-process loopback bus.
//!
//! Every session created by one [`LoopbackBroker`] shares a single bus.
//! Sends are JSON-encoded, fanned out to every subscription whose filter
//! matches the concrete topic, and decoded again on delivery, so a run over
//! the loopback bus pays a realistic serialization cost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pubsub_bench_core::{
    BrokerClient, BrokerError, ConnectConfig, Message, MessageStream, Publication, Qos,
    ReceivedMessage, Resource, Session, Subscription, SubscriptionOptions,
};
use tokio::sync::mpsc;

// ============================================================================
// Topic Matching
// ============================================================================

/// Single-level wildcard in a subscription filter.
pub const SINGLE_LEVEL: &str = "*";

/// Multi-level wildcard; only valid as the last level of a filter.
pub const MULTI_LEVEL: &str = ">";

/// Whether a subscription `filter` matches the concrete `topic`.
///
/// Levels are separated by `.`. `*` matches exactly one level and `>`
/// matches one or more trailing levels.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('.');
    let mut topic_levels = topic.split('.');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL), Some(_)) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn validate_topic(topic: &str) -> Result<(), BrokerError> {
    let reject = |reason: &str| BrokerError::Rejected {
        topic: topic.to_string(),
        reason: reason.to_string(),
    };

    if topic.is_empty() {
        return Err(reject("empty topic"));
    }
    let levels: Vec<&str> = topic.split('.').collect();
    if levels.iter().any(|level| level.is_empty()) {
        return Err(reject("empty topic level"));
    }
    if let Some(pos) = levels.iter().position(|level| *level == MULTI_LEVEL) {
        if pos != levels.len() - 1 {
            return Err(reject("'>' must be the last level"));
        }
    }
    Ok(())
}

// ============================================================================
// Bus
// ============================================================================

/// Encoded message in transit.
#[derive(Debug)]
struct Envelope {
    topic: String,
    payload: Arc<[u8]>,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    session_id: u64,
    filter: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Debug, Default)]
struct Bus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
}

impl Bus {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // Entries stay consistent even if a holder panicked mid-operation.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn subscribe(
        &self,
        session_id: u64,
        filter: &str,
    ) -> (u64, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id();
        self.subscribers().push(Subscriber {
            id,
            session_id,
            filter: filter.to_string(),
            tx,
        });
        (id, rx)
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    fn drop_session(&self, session_id: u64) {
        self.subscribers().retain(|s| s.session_id != session_id);
    }

    /// Deliver to every matching subscriber, returning the fanout count.
    fn publish(&self, topic: &str, payload: Arc<[u8]>) -> usize {
        let mut subscribers = self.subscribers();
        let mut delivered = 0;
        subscribers.retain(|s| {
            if !topic_matches(&s.filter, topic) {
                return true;
            }
            let envelope = Envelope {
                topic: topic.to_string(),
                payload: Arc::clone(&payload),
            };
            match s.tx.send(envelope) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // Receiver dropped without a stop; forget it.
                Err(_) => false,
            }
        });
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }
}

// ============================================================================
// Broker Client
// ============================================================================

/// Loopback broker client.
///
/// # Example
///
/// ```ignore
/// let broker = Arc::new(LoopbackBroker::new().with_send_latency(Duration::from_micros(50)));
/// let session = broker.connect(&ConnectConfig::new("localhost")).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoopbackBroker {
    bus: Arc<Bus>,
    send_latency: Duration,
    credentials: Option<(String, String)>,
}

impl LoopbackBroker {
    /// Create a broker with an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every send by `latency` before delivery.
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    /// Require these credentials on connect.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Number of subscriptions currently attached to the bus.
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscribers().len()
    }

    /// Total deliveries made by the bus.
    pub fn delivered(&self) -> u64 {
        self.bus.delivered.load(Ordering::Relaxed)
    }

    fn authenticate(&self, config: &ConnectConfig) -> Result<(), BrokerError> {
        let Some((username, password)) = &self.credentials else {
            return Ok(());
        };
        let supplied = (config.username.as_deref(), config.password.as_deref());
        if supplied == (Some(username.as_str()), Some(password.as_str())) {
            Ok(())
        } else {
            Err(BrokerError::Auth(format!(
                "invalid credentials for user {}",
                config.username.as_deref().unwrap_or("<none>")
            )))
        }
    }
}

#[async_trait]
impl BrokerClient for LoopbackBroker {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn connect(&self, config: &ConnectConfig) -> Result<Arc<dyn Session>, BrokerError> {
        if config.primary.is_empty() {
            return Err(BrokerError::Connection("no primary server given".into()));
        }
        self.authenticate(config)?;

        let id = self.bus.next_id();
        tracing::debug!(
            session_id = id,
            primary = %config.primary,
            client_name = ?config.client_name,
            "Loopback session opened"
        );
        Ok(Arc::new(LoopbackSession {
            id,
            bus: Arc::clone(&self.bus),
            closed: Arc::new(AtomicBool::new(false)),
            send_latency: self.send_latency,
        }))
    }
}

// ============================================================================
// Session
// ============================================================================

struct LoopbackSession {
    id: u64,
    bus: Arc<Bus>,
    closed: Arc<AtomicBool>,
    send_latency: Duration,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for LoopbackSession {
    async fn create_publication(
        &self,
        topic: &str,
    ) -> Result<Arc<dyn Publication>, BrokerError> {
        self.ensure_open()?;
        validate_topic(topic)?;

        Ok(Arc::new(LoopbackPublication {
            topic: topic.to_string(),
            bus: Arc::clone(&self.bus),
            session_closed: Arc::clone(&self.closed),
            stopped: AtomicBool::new(false),
            send_latency: self.send_latency,
        }))
    }

    async fn create_subscription(
        &self,
        topic: &str,
        options: &SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        self.ensure_open()?;
        validate_topic(topic)?;
        if options.qos == Qos::GuaranteedDelivery && options.name.is_none() {
            return Err(BrokerError::Rejected {
                topic: topic.to_string(),
                reason: "guaranteed delivery requires a subscription name".into(),
            });
        }

        let (id, rx) = self.bus.subscribe(self.id, topic);
        tracing::debug!(
            subscription_id = id,
            topic,
            qos = %options.qos,
            "Loopback subscription attached"
        );

        Ok(Arc::new(LoopbackSubscription {
            id,
            topic: topic.to_string(),
            qos: options.qos,
            bus: Arc::clone(&self.bus),
            session_closed: Arc::clone(&self.closed),
            stopped: AtomicBool::new(false),
            rx: Mutex::new(Some(rx)),
            acked: AtomicU64::new(0),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        self.bus.drop_session(self.id);
        tracing::debug!(session_id = self.id, "Loopback session closed");
        Ok(())
    }
}

// ============================================================================
// Publication
// ============================================================================

struct LoopbackPublication {
    topic: String,
    bus: Arc<Bus>,
    session_closed: Arc<AtomicBool>,
    stopped: AtomicBool,
    send_latency: Duration,
}

#[async_trait]
impl Resource for LoopbackPublication {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Publication for LoopbackPublication {
    async fn send(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        if self.session_closed.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let payload: Arc<[u8]> = serde_json::to_vec(&message)
            .map_err(|e| BrokerError::Send(format!("encode failed: {e}")))?
            .into();

        if !self.send_latency.is_zero() {
            tokio::time::sleep(self.send_latency).await;
        }

        let delivered = self.bus.publish(topic, payload);
        tracing::trace!(topic, sequence = message.sequence, delivered, "Loopback send");
        Ok(())
    }
}

// ============================================================================
// Subscription
// ============================================================================

struct LoopbackSubscription {
    id: u64,
    topic: String,
    qos: Qos,
    bus: Arc<Bus>,
    session_closed: Arc<AtomicBool>,
    stopped: AtomicBool,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    acked: AtomicU64,
}

#[async_trait]
impl Resource for LoopbackSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        self.bus.unsubscribe(self.id);
        tracing::debug!(
            subscription_id = self.id,
            topic = %self.topic,
            acked = self.acked.load(Ordering::Relaxed),
            "Loopback subscription detached"
        );
        Ok(())
    }
}

#[async_trait]
impl Subscription for LoopbackSubscription {
    fn qos(&self) -> Qos {
        self.qos
    }

    fn take_messages(&self) -> Option<MessageStream> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                let envelope = rx.recv().await?;
                match serde_json::from_slice::<Message>(&envelope.payload) {
                    Ok(message) => {
                        return Some((ReceivedMessage::new(envelope.topic, message), rx));
                    }
                    Err(e) => {
                        tracing::warn!(
                            topic = %envelope.topic,
                            error = %e,
                            "Dropping undecodable message"
                        );
                    }
                }
            }
        });
        Some(Box::pin(stream))
    }

    async fn ack(&self, _message: &ReceivedMessage) -> Result<(), BrokerError> {
        if self.session_closed.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        self.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn session(broker: &LoopbackBroker) -> Arc<dyn Session> {
        broker.connect(&ConnectConfig::new("localhost")).await.unwrap()
    }

    #[test]
    fn test_topic_matches_exact() {
        assert!(topic_matches("A.B.C", "A.B.C"));
        assert!(!topic_matches("A.B.C", "A.B"));
        assert!(!topic_matches("A.B", "A.B.C"));
    }

    #[test]
    fn test_topic_matches_single_level() {
        assert!(topic_matches("TEST.*", "TEST.T0"));
        assert!(topic_matches("A.*.C", "A.B.C"));
        assert!(!topic_matches("TEST.*", "TEST.T0.X"));
        assert!(!topic_matches("TEST.*", "TEST"));
    }

    #[test]
    fn test_topic_matches_multi_level() {
        assert!(topic_matches("TEST.>", "TEST.T0"));
        assert!(topic_matches("TEST.>", "TEST.T0.X.Y"));
        assert!(!topic_matches("TEST.>", "TEST"));
        assert!(topic_matches(">", "ANY.THING"));
    }

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("A.B").is_ok());
        assert!(validate_topic("A.>").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("A..B").is_err());
        assert!(matches!(
            validate_topic("A.>.B"),
            Err(BrokerError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_delivers_to_matching_subscriptions() {
        let broker = LoopbackBroker::new();
        let session = session(&broker).await;

        let wildcard = session
            .create_subscription("TEST.*", &SubscriptionOptions::default())
            .await
            .unwrap();
        let other = session
            .create_subscription("OTHER", &SubscriptionOptions::default())
            .await
            .unwrap();
        let publication = session.create_publication("TEST.*").await.unwrap();

        publication
            .send("TEST.T3", Message::new("TEST.*", 1))
            .await
            .unwrap();

        let mut stream = wildcard.take_messages().unwrap();
        let received = stream.next().await.unwrap();
        assert_eq!(received.topic, "TEST.T3");
        assert_eq!(received.message.sequence, 1);
        assert_eq!(received.message.publication_topic, "TEST.*");
        assert!(received.latency_ms() >= 0.0);

        assert_eq!(broker.delivered(), 1);
        drop(other);
    }

    #[tokio::test]
    async fn test_take_messages_once() {
        let broker = LoopbackBroker::new();
        let subscription = session(&broker)
            .await
            .create_subscription("A", &SubscriptionOptions::default())
            .await
            .unwrap();

        assert!(subscription.take_messages().is_some());
        assert!(subscription.take_messages().is_none());
    }

    #[tokio::test]
    async fn test_send_after_stop_is_closed() {
        let broker = LoopbackBroker::new();
        let publication = session(&broker).await.create_publication("A").await.unwrap();

        publication.stop().await.unwrap();
        let err = publication.send("A", Message::new("A", 1)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Closed));
        assert!(matches!(publication.stop().await, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn test_close_ends_subscription_streams() {
        let broker = LoopbackBroker::new();
        let session = session(&broker).await;
        let subscription = session
            .create_subscription("A", &SubscriptionOptions::default())
            .await
            .unwrap();
        let mut stream = subscription.take_messages().unwrap();
        assert_eq!(broker.subscriber_count(), 1);

        session.close().await.unwrap();

        assert_eq!(broker.subscriber_count(), 0);
        assert!(stream.next().await.is_none());
        assert!(session.create_publication("A").await.is_err());
        assert!(matches!(session.close().await, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn test_stop_detaches_subscription() {
        let broker = LoopbackBroker::new();
        let session = session(&broker).await;
        let subscription = session
            .create_subscription("A", &SubscriptionOptions::default())
            .await
            .unwrap();
        let publication = session.create_publication("A").await.unwrap();

        subscription.stop().await.unwrap();
        publication.send("A", Message::new("A", 1)).await.unwrap();

        assert_eq!(broker.delivered(), 0);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_credentials_enforced() {
        let broker = LoopbackBroker::new().with_credentials("user", "secret");

        let err = broker
            .connect(&ConnectConfig::new("localhost"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::Auth(_)));

        let config = ConnectConfig::new("localhost").with_credentials("user", "secret");
        assert!(broker.connect(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_primary_rejected() {
        let err = LoopbackBroker::new()
            .connect(&ConnectConfig::new(""))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::Connection(_)));
    }

    #[tokio::test]
    async fn test_gd_subscription_requires_name() {
        let broker = LoopbackBroker::new();
        let session = session(&broker).await;
        let options = SubscriptionOptions {
            qos: Qos::GuaranteedDelivery,
            ..Default::default()
        };

        assert!(session.create_subscription("A", &options).await.is_err());

        let named = SubscriptionOptions {
            name: Some("durable".into()),
            ..options
        };
        let subscription = session.create_subscription("A", &named).await.unwrap();
        assert_eq!(subscription.qos(), Qos::GuaranteedDelivery);
    }

    #[tokio::test]
    async fn test_send_latency_applied() {
        let broker = LoopbackBroker::new().with_send_latency(Duration::from_millis(20));
        let publication = session(&broker).await.create_publication("A").await.unwrap();

        let start = std::time::Instant::now();
        publication.send("A", Message::new("A", 1)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
