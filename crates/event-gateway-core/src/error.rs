// File: src/error.rs
//
// Error taxonomy shared by all event-gateway crates

use std::time::Duration;

/// Result type for event-gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Primary error type for all event-gateway operations.
///
/// Variants map to handling policies rather than to the subsystem that
/// raised them: transport errors force redelivery, parse errors drop the
/// record un-acknowledged, configuration errors fail startup.
#[derive(Debug, thiserror::Error, Clone)]
pub enum GatewayError {
    /// Broker/bus/store connectivity blip. Retried locally, then surfaced
    /// to the transport so the broker redelivers.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Database failure other than unique-on-message-id, or transaction
    /// failure. Rolled back and bubbled up.
    #[error("Store error: {message}")]
    Store { message: String },

    /// Malformed payload or metadata. Logged at warn, record left
    /// un-acknowledged upstream.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Failed to serialize or deserialize a value on a trusted path.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Missing or contradictory configuration at startup. Fail fast.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A typed handler failed after retry exhaustion.
    #[error("Handler error: {message}")]
    Handler { message: String },

    /// Intentional exception keeping a broker message un-acknowledged.
    /// Raised only in the development ack-disabled mode; the listener
    /// error handler downgrades it to debug.
    #[error("Redelivery forced (acknowledge suppressed)")]
    RedeliveryForced,

    /// An interruptible wait was cut short by shutdown.
    #[error("Interrupted by shutdown after {waited:?}")]
    Interrupted { waited: Duration },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        GatewayError::Transport { message: message.into() }
    }

    pub fn store(message: impl Into<String>) -> Self {
        GatewayError::Store { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        GatewayError::Parse { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        GatewayError::Configuration { message: message.into() }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        GatewayError::Handler { message: message.into() }
    }

    /// Whether the failure is worth a local bounded retry before the
    /// transport is asked to redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. } | GatewayError::Store { .. } | GatewayError::Handler { .. }
        )
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(error: std::io::Error) -> Self {
        GatewayError::Transport {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<diesel::result::Error> for GatewayError {
    fn from(error: diesel::result::Error) -> Self {
        GatewayError::Store {
            message: error.to_string(),
        }
    }
}

impl From<diesel::r2d2::PoolError> for GatewayError {
    fn from(error: diesel::r2d2::PoolError) -> Self {
        GatewayError::Store {
            message: format!("Connection pool error: {}", error),
        }
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(error: redis::RedisError) -> Self {
        GatewayError::Transport {
            message: error.to_string(),
        }
    }
}
