//! Run configuration types

use crate::pacer::send_period;
use crate::topic;
use crate::traits::StopCondition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which stage pipeline a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Burst-publish on every configured topic
    #[default]
    Publish,
    /// Subscribe on every expanded topic and count deliveries
    Subscribe,
    /// Publish and subscribe on one topic, measuring round-trip latency
    Ping,
}

/// Quality-of-service tier of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Qos {
    /// Best effort
    #[default]
    #[serde(rename = "BE")]
    BestEffort,
    /// Guaranteed connection
    #[serde(rename = "GC")]
    GuaranteedConnection,
    /// Guaranteed delivery
    #[serde(rename = "GD")]
    GuaranteedDelivery,
}

impl Qos {
    /// Short code used on the command line ("BE", "GC", "GD")
    pub fn code(&self) -> &'static str {
        match self {
            Qos::BestEffort => "BE",
            Qos::GuaranteedConnection => "GC",
            Qos::GuaranteedDelivery => "GD",
        }
    }
}

impl std::str::FromStr for Qos {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BE" => Ok(Qos::BestEffort),
            "GC" => Ok(Qos::GuaranteedConnection),
            "GD" => Ok(Qos::GuaranteedDelivery),
            other => Err(ConfigError::InvalidQos(other.to_string())),
        }
    }
}

impl std::fmt::Display for Qos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Message acknowledgment mode for guaranteed-delivery subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// The broker client acknowledges on delivery
    #[default]
    Auto,
    /// The receiver acknowledges each message explicitly
    Manual,
}

impl std::str::FromStr for AckMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AckMode::Auto),
            "manual" => Ok(AckMode::Manual),
            other => Err(ConfigError::InvalidAckMode(other.to_string())),
        }
    }
}

/// Session credentials and topology
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Login name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Login password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Primary broker address
    pub primary: String,

    /// Standby broker address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,

    /// Client name, required for guaranteed delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl ConnectConfig {
    /// Create a config targeting `primary`
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            ..Default::default()
        }
    }

    /// Parse a `primary[:secondary]` pair
    pub fn from_pair(pair: &str) -> Self {
        let mut parts = pair.splitn(2, ':');
        let primary = parts.next().unwrap_or_default().to_string();
        let secondary = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            primary,
            secondary,
            ..Default::default()
        }
    }

    /// Set login credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the client name
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }
}

/// Subscription creation options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Requested QoS tier
    pub qos: Qos,

    /// Durable subscription name, required for guaranteed delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Acknowledgment mode
    pub ack_mode: AckMode,
}

/// Wildcard expansion settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardConfig {
    /// Number of concrete topics per wildcard pattern (0 = use pattern verbatim)
    pub count: usize,

    /// First leaf index
    pub start: usize,
}

impl Default for WildcardConfig {
    fn default() -> Self {
        Self { count: 1, start: 0 }
    }
}

/// Burst pacing settings shared by every pacer of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Messages sent back-to-back per cycle
    pub burst_size: usize,

    /// Pause between bursts
    pub delay: Duration,

    /// Optional cap in messages per second (per pacer)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,

    /// Optional cap on run-wide outstanding sends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_outstanding: Option<usize>,

    /// Bounded re-check interval while waiting on outstanding sends
    pub drain_poll_interval: Duration,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            burst_size: 10,
            delay: Duration::from_millis(10),
            rate_limit: None,
            max_outstanding: None,
            drain_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Ping mode settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Number of pings
    pub count: usize,

    /// Gap between pings
    pub interval: Duration,

    /// How long to keep listening for replies after the last ping is sent
    pub receive_grace: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 100,
            interval: Duration::from_millis(10),
            receive_grace: Duration::from_secs(5),
        }
    }
}

/// Default topic used when none is configured
pub const DEFAULT_TOPIC: &str = "TEST.BULK.*";

/// Default ping topic
pub const DEFAULT_PING_TOPIC: &str = "PING";

/// Run configuration
///
/// Defines which pipeline runs, which topics it touches, how pacers send,
/// and when the test window closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pipeline to run
    pub mode: RunMode,

    /// Session settings
    pub connect: ConnectConfig,

    /// Topic patterns
    pub topics: Vec<String>,

    /// Wildcard expansion
    pub wildcard: WildcardConfig,

    /// Burst pacing
    pub pacer: PacerConfig,

    /// Test window stop condition
    pub stop_condition: StopCondition,

    /// Subscription options (subscribe mode)
    pub subscription: SubscriptionOptions,

    /// Ping settings (ping mode)
    pub ping: PingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            connect: ConnectConfig::default(),
            topics: vec![DEFAULT_TOPIC.to_string()],
            wildcard: WildcardConfig::default(),
            pacer: PacerConfig::default(),
            stop_condition: StopCondition::default(),
            subscription: SubscriptionOptions::default(),
            ping: PingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Create a config for the given mode
    ///
    /// Ping mode defaults to the `PING` topic.
    pub fn new(mode: RunMode) -> Self {
        let topics = match mode {
            RunMode::Ping => vec![DEFAULT_PING_TOPIC.to_string()],
            _ => vec![DEFAULT_TOPIC.to_string()],
        };
        Self {
            mode,
            topics,
            ..Default::default()
        }
    }

    /// Set the session config
    pub fn with_connect(mut self, connect: ConnectConfig) -> Self {
        self.connect = connect;
        self
    }

    /// Set the topic patterns
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set wildcard expansion
    pub fn with_wildcard(mut self, count: usize, start: usize) -> Self {
        self.wildcard = WildcardConfig { count, start };
        self
    }

    /// Set burst size and inter-burst delay
    pub fn with_burst(mut self, burst_size: usize, delay: Duration) -> Self {
        self.pacer.burst_size = burst_size;
        self.pacer.delay = delay;
        self
    }

    /// Set the per-pacer rate limit
    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.pacer.rate_limit = Some(rps);
        self
    }

    /// Set the outstanding-send cap
    pub fn with_max_outstanding(mut self, limit: usize) -> Self {
        self.pacer.max_outstanding = Some(limit);
        self
    }

    /// Set the stop condition
    pub fn with_stop_condition(mut self, stop: StopCondition) -> Self {
        self.stop_condition = stop;
        self
    }

    /// Set subscription options
    pub fn with_subscription(mut self, options: SubscriptionOptions) -> Self {
        self.subscription = options;
        self
    }

    /// Set ping settings
    pub fn with_ping(mut self, count: usize, interval: Duration) -> Self {
        self.ping.count = count;
        self.ping.interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topics.is_empty() {
            return Err(ConfigError::InvalidTopic("at least one topic is required".into()));
        }

        for pattern in &self.topics {
            if pattern.is_empty() {
                return Err(ConfigError::InvalidTopic("topic must not be empty".into()));
            }
            let markers = topic::wildcard_markers(pattern);
            if markers > 1 {
                return Err(ConfigError::InvalidTopic(format!(
                    "{pattern} has {markers} wildcard markers, at most one is supported"
                )));
            }
        }

        if self.pacer.burst_size == 0 {
            return Err(ConfigError::InvalidPacer("burst size must be at least 1".into()));
        }

        if let Some(rps) = self.pacer.rate_limit {
            if !(rps.is_finite() && rps > 0.0) {
                return Err(ConfigError::InvalidPacer("rate limit must be positive".into()));
            }
            if send_period(rps).is_none() {
                return Err(ConfigError::InvalidPacer(format!(
                    "rate limit {rps} msg/s is too small"
                )));
            }
        }

        if self.pacer.max_outstanding == Some(0) {
            return Err(ConfigError::InvalidPacer(
                "max outstanding must be at least 1".into(),
            ));
        }

        if self.pacer.drain_poll_interval.is_zero() {
            return Err(ConfigError::InvalidPacer(
                "drain poll interval must be non-zero".into(),
            ));
        }

        if let StopCondition::Cycles(0) = self.stop_condition {
            return Err(ConfigError::InvalidStopCondition(
                "cycle count must be at least 1".into(),
            ));
        }

        if self.mode == RunMode::Subscribe && self.subscription.qos == Qos::GuaranteedDelivery {
            if self.subscription.name.is_none() {
                return Err(ConfigError::MissingField("subscription name (required for GD)"));
            }
            if self.connect.client_name.is_none() {
                return Err(ConfigError::MissingField("client name (required for GD)"));
            }
        }

        if self.mode == RunMode::Ping {
            if self.ping.count == 0 {
                return Err(ConfigError::InvalidPing("count must be at least 1".into()));
            }
            if self.topics.len() != 1 {
                return Err(ConfigError::InvalidPing("ping runs on exactly one topic".into()));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid topic pattern or topic list
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Invalid pacer settings
    #[error("Invalid pacer settings: {0}")]
    InvalidPacer(String),

    /// Invalid stop condition
    #[error("Invalid stop condition: {0}")]
    InvalidStopCondition(String),

    /// Invalid ping settings
    #[error("Invalid ping settings: {0}")]
    InvalidPing(String),

    /// Unknown QoS code
    #[error("Invalid QoS: {0} (expected BE, GC or GD)")]
    InvalidQos(String),

    /// Unknown ack mode
    #[error("Invalid ack mode: {0} (expected auto or manual)")]
    InvalidAckMode(String),

    /// A field required by the chosen options is missing
    #[error("Missing {0}")]
    MissingField(&'static str),
}
