//! Custom error types for the application.
//!
//! This module defines the primary error type, `MonitorError`, for the entire
//! service. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures the pipeline can
//! hit, from configuration and I/O issues to broker and store problems.
//!
//! The variants fall into four families with different recovery policies:
//!
//! - **Configuration** (`Config`, `Configuration`): fatal at startup. The
//!   process must not start with a blank broker endpoint or inverted bounds.
//! - **Connection** (`Broker`, `ConnectTimeout`, `Subscribe`, `LinkClosed`):
//!   recovered by the scheduled reconnect, never fatal to the process.
//! - **Sink** (`Store`, `StoreDisabled`, plus publish failures surfaced as
//!   connection errors): isolated per tick; logged, never propagated to the
//!   other sinks or to the scheduler.
//! - **Serialization** (`Serialization`, `MalformedPayload`): the offending
//!   message is dropped and logged; connection state is unaffected.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("broker handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("subscription to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("broker link is closed")]
    LinkClosed,

    #[error("monitor is not running")]
    MonitorStopped,

    #[error("store error: {0}")]
    Store(String),

    #[error("archiving disabled after store initialization failure")]
    StoreDisabled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed payload on '{topic}': {payload:?}")]
    MalformedPayload { topic: String, payload: String },
}

impl MonitorError {
    /// Whether the scheduled reconnect path is expected to recover from this
    /// error. Configuration and store errors are not connection problems.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MonitorError::Broker(_)
                | MonitorError::ConnectTimeout(_)
                | MonitorError::Subscribe { .. }
                | MonitorError::LinkClosed
        )
    }
}
