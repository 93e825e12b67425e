//! Mock broker client for unit tests

use crate::config::{ConnectConfig, Qos, SubscriptionOptions};
use crate::message::{Message, ReceivedMessage};
use crate::traits::{
    BrokerClient, BrokerError, MessageStream, Publication, Resource, Session, Subscription,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default, Clone)]
struct MockConfig {
    fail_connect: bool,
    failing_topics: HashSet<String>,
    create_delays: HashMap<String, Duration>,
    fail_every_nth_send: Option<u64>,
    send_delay: Duration,
    fail_stop: HashSet<String>,
    fail_close: bool,
    fail_acks: bool,
}

/// Everything the mock observed, shared by every handle it created
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub send_attempts: AtomicU64,
    pub sends_ok: AtomicU64,
    pub acks: AtomicU64,
    pub stops: AtomicUsize,
    pub closes: AtomicUsize,
    pub create_attempts: AtomicUsize,
    sent_topics: Mutex<Vec<String>>,
    lifecycle: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<ReceivedMessage>)>>,
}

impl MockLog {
    /// Topics of accepted sends, in completion order
    pub fn sent_topics(&self) -> Vec<String> {
        self.sent_topics.lock().unwrap().clone()
    }

    /// Ordered `create:`/`stop:`/`close` entries
    pub fn lifecycle(&self) -> Vec<String> {
        self.lifecycle.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.lifecycle.lock().unwrap().push(entry);
    }

    fn deliver(&self, topic: &str, message: &Message) {
        let subscribers = self.subscribers.lock().unwrap();
        for (filter, tx) in subscribers.iter() {
            if filter == topic {
                let _ = tx.send(ReceivedMessage::new(topic, message.clone()));
            }
        }
    }
}

/// Configurable in-memory broker client
#[derive(Debug, Default, Clone)]
pub(crate) struct MockBroker {
    config: MockConfig,
    log: Arc<MockLog>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(mut self) -> Self {
        self.config.fail_connect = true;
        self
    }

    pub fn failing_topic(mut self, topic: &str) -> Self {
        self.config.failing_topics.insert(topic.to_string());
        self
    }

    pub fn create_delay(mut self, topic: &str, delay: Duration) -> Self {
        self.config.create_delays.insert(topic.to_string(), delay);
        self
    }

    /// Fail every `n`-th send attempt across the whole session
    pub fn fail_every_nth_send(mut self, n: u64) -> Self {
        self.config.fail_every_nth_send = Some(n);
        self
    }

    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.config.send_delay = delay;
        self
    }

    pub fn failing_stop(mut self, topic: &str) -> Self {
        self.config.fail_stop.insert(topic.to_string());
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.config.fail_close = true;
        self
    }

    pub fn fail_acks(mut self) -> Self {
        self.config.fail_acks = true;
        self
    }

    pub fn log(&self) -> Arc<MockLog> {
        Arc::clone(&self.log)
    }

    pub fn client(&self) -> Arc<dyn BrokerClient> {
        Arc::new(self.clone())
    }

    pub fn session(&self) -> Arc<dyn Session> {
        Arc::new(MockSession {
            config: Arc::new(self.config.clone()),
            log: Arc::clone(&self.log),
        })
    }

    pub async fn publication(&self, topic: &str) -> Arc<dyn Publication> {
        self.session().create_publication(topic).await.unwrap()
    }

    pub async fn subscription(&self, topic: &str) -> Arc<dyn Subscription> {
        self.session()
            .create_subscription(topic, &SubscriptionOptions::default())
            .await
            .unwrap()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, _config: &ConnectConfig) -> Result<Arc<dyn Session>, BrokerError> {
        if self.config.fail_connect {
            return Err(BrokerError::Connection("mock refused connection".into()));
        }
        Ok(self.session())
    }
}

struct MockSession {
    config: Arc<MockConfig>,
    log: Arc<MockLog>,
}

impl MockSession {
    async fn admit(&self, kind: &str, topic: &str) -> Result<(), BrokerError> {
        self.log.create_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.config.create_delays.get(topic) {
            tokio::time::sleep(*delay).await;
        }
        if self.config.failing_topics.contains(topic) {
            return Err(BrokerError::Rejected {
                topic: topic.to_string(),
                reason: "mock rejection".into(),
            });
        }
        self.log.record(format!("create:{kind}:{topic}"));
        Ok(())
    }
}

#[async_trait]
impl Session for MockSession {
    async fn create_publication(
        &self,
        topic: &str,
    ) -> Result<Arc<dyn Publication>, BrokerError> {
        self.admit("pub", topic).await?;
        Ok(Arc::new(MockPublication {
            topic: topic.to_string(),
            config: Arc::clone(&self.config),
            log: Arc::clone(&self.log),
            stopped: AtomicBool::new(false),
        }))
    }

    async fn create_subscription(
        &self,
        topic: &str,
        options: &SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        self.admit("sub", topic).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.log
            .subscribers
            .lock()
            .unwrap()
            .push((topic.to_string(), tx));
        Ok(Arc::new(MockSubscription {
            topic: topic.to_string(),
            qos: options.qos,
            config: Arc::clone(&self.config),
            log: Arc::clone(&self.log),
            rx: Mutex::new(Some(rx)),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.log.record("close".to_string());
        if self.config.fail_close {
            return Err(BrokerError::Other("mock close failure".into()));
        }
        Ok(())
    }
}

struct MockPublication {
    topic: String,
    config: Arc<MockConfig>,
    log: Arc<MockLog>,
    stopped: AtomicBool,
}

#[async_trait]
impl Resource for MockPublication {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        stop_resource(&self.config, &self.log, "pub", &self.topic, &self.stopped)
    }
}

#[async_trait]
impl Publication for MockPublication {
    async fn send(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let attempt = self.log.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.config.send_delay.is_zero() {
            tokio::time::sleep(self.config.send_delay).await;
        }
        if let Some(n) = self.config.fail_every_nth_send {
            if attempt % n == 0 {
                return Err(BrokerError::Send(format!("mock failure on attempt {attempt}")));
            }
        }
        self.log.sent_topics.lock().unwrap().push(topic.to_string());
        self.log.deliver(topic, &message);
        self.log.sends_ok.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSubscription {
    topic: String,
    qos: Qos,
    config: Arc<MockConfig>,
    log: Arc<MockLog>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ReceivedMessage>>>,
}

#[async_trait]
impl Resource for MockSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let stopped = AtomicBool::new(false);
        stop_resource(&self.config, &self.log, "sub", &self.topic, &stopped)
    }
}

#[async_trait]
impl Subscription for MockSubscription {
    fn qos(&self) -> Qos {
        self.qos
    }

    fn take_messages(&self) -> Option<MessageStream> {
        let rx = self.rx.lock().unwrap().take()?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Some(Box::pin(stream))
    }

    async fn ack(&self, _message: &ReceivedMessage) -> Result<(), BrokerError> {
        if self.config.fail_acks {
            return Err(BrokerError::Other("mock ack failure".into()));
        }
        self.log.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn stop_resource(
    config: &MockConfig,
    log: &MockLog,
    kind: &str,
    topic: &str,
    stopped: &AtomicBool,
) -> Result<(), BrokerError> {
    log.stops.fetch_add(1, Ordering::SeqCst);
    log.record(format!("stop:{kind}:{topic}"));
    stopped.store(true, Ordering::SeqCst);
    if config.fail_stop.contains(topic) {
        return Err(BrokerError::Other(format!("mock stop failure on {topic}")));
    }
    Ok(())
}
