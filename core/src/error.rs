//! Error types for pubsub-bench-core

use std::fmt;

use thiserror::Error;

/// Classification of a [`BenchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid or missing configuration
    Config,
    /// Session could not be established
    Connect,
    /// Publication or subscription could not be created or stopped
    Resource,
    /// Message send failed
    Send,
    /// Session-level failure after connect (e.g. close)
    Session,
    /// An internal counting invariant was violated
    Invariant,
    /// Orchestration failure (task panic, no usable resources)
    Orchestration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "configuration error",
            ErrorKind::Connect => "connect error",
            ErrorKind::Resource => "resource error",
            ErrorKind::Send => "send error",
            ErrorKind::Session => "session error",
            ErrorKind::Invariant => "invariant violation",
            ErrorKind::Orchestration => "orchestration error",
        };
        f.write_str(name)
    }
}

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BenchError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl BenchError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A required builder field was never set
    pub fn missing_config(field: &str) -> Self {
        Self::new(
            ErrorKind::Config,
            format!("missing required field: {field}"),
        )
    }

    /// Configuration failed validation
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// A counter or state machine invariant was broken
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, message)
    }

    /// Orchestration-level failure
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Orchestration, message)
    }

    /// Wrap a broker error
    pub fn broker(err: &crate::traits::BrokerError) -> Self {
        Self::new(err.to_error_kind(), err.to_string())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
