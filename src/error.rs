//! Unified error types for the arbitrage engine.

use thiserror::Error;

use crate::venue::VenueId;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Venue-related error.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// Execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Price cache error.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A configuration value outside its accepted range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ConfigError {
    /// Environment variable name.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl ConfigError {
    /// Create a new configuration error.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Venue polling errors. All of them are transient and scoped to one venue.
#[derive(Error, Debug)]
pub enum VenueError {
    /// Network or API failure.
    #[error("venue {venue} unavailable: {reason}")]
    Unavailable {
        /// Venue that failed.
        venue: VenueId,
        /// Reason for failure.
        reason: String,
    },

    /// The venue answered with something we cannot use.
    #[error("venue {venue} returned invalid data: {reason}")]
    DataInvalid {
        /// Venue that failed.
        venue: VenueId,
        /// What was wrong with the payload.
        reason: String,
    },

    /// Request exceeded its deadline.
    #[error("venue {venue} timed out after {timeout_ms}ms")]
    Timeout {
        /// Venue that timed out.
        venue: VenueId,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Venue is suspended after repeated failures.
    #[error("circuit open for venue {venue}: {remaining_seconds}s remaining")]
    CircuitOpen {
        /// Suspended venue.
        venue: VenueId,
        /// Seconds left in the cooldown.
        remaining_seconds: u64,
    },
}

impl VenueError {
    /// Venue the error belongs to.
    pub fn venue(&self) -> &VenueId {
        match self {
            Self::Unavailable { venue, .. }
            | Self::DataInvalid { venue, .. }
            | Self::Timeout { venue, .. }
            | Self::CircuitOpen { venue, .. } => venue,
        }
    }

    /// Whether this failure should be waited out with backoff.
    ///
    /// Invalid data skips the cycle and waits the normal poll interval.
    pub fn wants_backoff(&self) -> bool {
        !matches!(self, Self::DataInvalid { .. })
    }
}

/// Errors raised by an execution backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend rejected the order.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Execution pipeline errors. Each one terminates only its own run.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Order construction failed.
    #[error("failed to build order: {0}")]
    Build(String),

    /// Backend rejected or failed the submission.
    #[error("submission failed: {0}")]
    Submit(#[from] BackendError),

    /// Backend did not answer before the deadline.
    #[error("submission timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The pipeline task itself died.
    #[error("execution task failed: {0}")]
    Task(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_invalid_skips_backoff() {
        let venue = VenueId::new("raydium");
        let invalid = VenueError::DataInvalid {
            venue: venue.clone(),
            reason: "empty".to_string(),
        };
        let down = VenueError::Unavailable {
            venue: venue.clone(),
            reason: "HTTP 502".to_string(),
        };
        let slow = VenueError::Timeout {
            venue,
            timeout_ms: 5000,
        };

        assert!(!invalid.wants_backoff());
        assert!(down.wants_backoff());
        assert!(slow.wants_backoff());
    }

    #[test]
    fn config_error_names_the_field() {
        let err = ConfigError::new("MAX_SLIPPAGE_BPS", "must be between 0 and 1000");
        assert_eq!(err.to_string(), "MAX_SLIPPAGE_BPS: must be between 0 and 1000");
    }
}
