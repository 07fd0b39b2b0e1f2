//! Domain error type for rate-limit decisions.
//!
//! Every decision-path failure carries a stable code so the HTTP layer and
//! operators can classify errors without matching on message text.

use thiserror::Error;

/// Result type for rate-limit operations.
pub type LimitResult<T> = Result<T, LimitError>;

/// Errors surfaced by the rate-limit decision path.
#[derive(Debug, Error)]
pub enum LimitError {
    /// A route's policy names an algorithm that is not registered.
    #[error("algorithm '{0}' is not registered")]
    UnknownAlgorithm(String),

    /// Algorithm configuration failed validation.
    #[error("configuration validation failed: {0}")]
    InvalidConfig(String),

    /// Score store wire, timeout or decode failure.
    #[error("score store operation failed: {0}")]
    Store(String),

    /// The circuit breaker is rejecting calls to the score store.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// Configuration K/V store failure (transient for the watch loop).
    #[error("config provider operation failed: {0}")]
    Provider(String),

    /// An algorithm name was registered twice. Startup-only.
    #[error("algorithm '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl LimitError {
    /// Stable error code, independent of the message text.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownAlgorithm(_) => "UNKNOWN_ALGORITHM",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Store(_) => "REDIS_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Provider(_) => "CONSUL_ERROR",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
        }
    }

    /// Whether this error should count against the score-store circuit breaker.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(
            LimitError::UnknownAlgorithm("lru".into()).code(),
            "UNKNOWN_ALGORITHM"
        );
        assert_eq!(
            LimitError::InvalidConfig("limit must be positive".into()).code(),
            "INVALID_CONFIG"
        );
        assert_eq!(LimitError::Store("timeout".into()).code(), "REDIS_ERROR");
        assert_eq!(LimitError::CircuitOpen.code(), "CIRCUIT_OPEN");
        assert_eq!(LimitError::Provider("503".into()).code(), "CONSUL_ERROR");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = LimitError::UnknownAlgorithm("leaky_bucket".into());
        assert_eq!(err.to_string(), "algorithm 'leaky_bucket' is not registered");
    }

    #[test]
    fn test_store_failure_classification() {
        assert!(LimitError::Store("boom".into()).is_store_failure());
        assert!(!LimitError::CircuitOpen.is_store_failure());
        assert!(!LimitError::InvalidConfig("x".into()).is_store_failure());
    }
}
