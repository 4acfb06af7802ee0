//! Error types for the scanpoll library.
//!
//! Connector failures and scheduler failures are kept apart: a
//! [`ConnectorError`] describes what went wrong during one round trip with
//! the scanning service, while a [`SchedulerError`] describes why a job
//! could not be queued or why the scheduler could not be reached.

use std::time::Duration;
use thiserror::Error;

/// Error returned by a connector round trip.
///
/// The scheduler maps every variant onto a job event: rate limits are
/// recoverable, everything else ends the job.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The service throttled the caller.
    #[error("service limit reached on '{engine}': retry after {retry_after:?}")]
    RateLimited {
        /// Name of the connector.
        engine: String,
        /// Wait time suggested by the service, if any.
        retry_after: Option<Duration>,
    },

    /// The service rejected the configured key.
    #[error("invalid service key for '{engine}'")]
    InvalidServiceKey {
        /// Name of the connector.
        engine: String,
    },

    /// Network failure or an unexpected HTTP status.
    #[error("transport error on '{engine}': {message}")]
    Transport {
        /// Name of the connector.
        engine: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The reply could not be understood.
    #[error("malformed reply from '{engine}': {details}")]
    MalformedReply {
        /// Name of the connector.
        engine: String,
        /// Details about what could not be parsed.
        details: String,
    },

    /// The request was aborted at the transport level.
    #[error("request aborted")]
    Aborted,

    /// An I/O error occurred while preparing the request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Returns `true` if this error is the service's rate limit.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if this error ends the job it happened on.
    pub fn is_terminal(&self) -> bool {
        !self.is_rate_limit()
    }

    /// Returns the connector name if this error is associated with one.
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::RateLimited { engine, .. }
            | Self::InvalidServiceKey { engine }
            | Self::Transport { engine, .. }
            | Self::MalformedReply { engine, .. } => Some(engine),
            _ => None,
        }
    }

    /// Creates a `RateLimited` error without a retry hint.
    pub fn rate_limited(engine: impl Into<String>) -> Self {
        Self::RateLimited {
            engine: engine.into(),
            retry_after: None,
        }
    }

    /// Creates an `InvalidServiceKey` error.
    pub fn invalid_service_key(engine: impl Into<String>) -> Self {
        Self::InvalidServiceKey {
            engine: engine.into(),
        }
    }

    /// Creates a `Transport` error.
    pub fn transport(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Creates a `MalformedReply` error.
    pub fn malformed(engine: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedReply {
            engine: engine.into(),
            details: details.into(),
        }
    }
}

/// Error returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The resource name was empty.
    #[error("resource name is empty")]
    EmptyResource,

    /// The connector requires a service key and none was configured.
    #[error("connector '{engine}' requires a service key")]
    MissingServiceKey {
        /// Name of the connector.
        engine: String,
    },

    /// The file to submit does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// The file exceeds the connector's upload limit.
    #[error("file size {size} bytes exceeds maximum {max} bytes")]
    FileTooLarge {
        /// Actual file size in bytes.
        size: u64,
        /// Maximum accepted size in bytes.
        max: u64,
    },

    /// An I/O error occurred while inspecting the resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The scheduler event loop is no longer running.
    #[error("scheduler is not running")]
    Closed,
}

impl SchedulerError {
    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
