//! Diagnostic events emitted to the caller during a run

use serde::Serialize;
use tokio::sync::mpsc;

/// Kind of broker resource a lifecycle event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A publication
    Publication,
    /// A subscription
    Subscription,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Publication => f.write_str("publication"),
            ResourceKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Per-stage diagnostic event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Session established
    Connected {
        /// Broker client name
        client: String,
    },
    /// A resource was created
    ResourceCreated {
        /// Resource kind
        kind: ResourceKind,
        /// Topic index in the fanout
        index: usize,
        /// Topic
        topic: String,
    },
    /// A resource could not be created
    ResourceFailed {
        /// Resource kind
        kind: ResourceKind,
        /// Topic index in the fanout
        index: usize,
        /// Topic
        topic: String,
        /// Broker error text
        error: String,
    },
    /// A resource was stopped
    ResourceStopped {
        /// Resource kind
        kind: ResourceKind,
        /// Topic
        topic: String,
    },
    /// A resource could not be stopped
    TeardownFailed {
        /// Resource kind
        kind: ResourceKind,
        /// Topic
        topic: String,
        /// Broker error text
        error: String,
    },
    /// The test window opened
    TestStarted {
        /// Number of pacers or receivers started
        participants: usize,
    },
    /// A message send failed
    SendFailed {
        /// Concrete topic of the failed send
        topic: String,
        /// Broker error text
        error: String,
    },
    /// The test window closed
    TestComplete {
        /// Window length in milliseconds
        elapsed_ms: f64,
    },
    /// The session was closed
    SessionClosed,
    /// Closing the session failed
    SessionCloseFailed {
        /// Broker error text
        error: String,
    },
    /// Every resource is stopped and the session is closed
    ShutdownComplete,
}

/// Non-blocking sender for [`RunEvent`]s
///
/// Events are dropped when the channel is full or closed so a slow consumer
/// never stalls a pacer.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    /// Sink delivering into `tx`
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                tracing::trace!(error = %e, "Dropped diagnostic event");
            }
        }
    }
}
