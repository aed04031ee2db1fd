// src/infra/errors.rs — Error types for the capability boundaries

use thiserror::Error;

/// Failure of a text-generation call.
///
/// Transient failures (rate limits, timeouts, 5xx) may be retried by the caller
/// with backoff. Permanent failures (bad request, auth) never are.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generator '{provider}' transient error: {message}")]
    Transient { provider: String, message: String },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Generator '{provider}' permanent error: {message}")]
    Permanent { provider: String, message: String },
}

impl GenerationError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GenerationError::Transient { .. } | GenerationError::RateLimited { .. }
        )
    }

    /// Server-suggested delay before the next try, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            GenerationError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
                Some(*retry_after_ms)
            }
            _ => None,
        }
    }
}

/// The execution environment itself could not be provisioned or driven.
///
/// Distinct from a failing verdict: a `Fail` verdict is a successful execution
/// that found a bug.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Executor '{executor}' infrastructure error: {message}")]
pub struct ExecutionInfraError {
    pub executor: String,
    pub message: String,
}

impl ExecutionInfraError {
    pub fn new(executor: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            executor: executor.into(),
            message: message.into(),
        }
    }
}

/// Skill store failures (query, upsert, reinforce, embedding).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Skill '{id}' not found")]
    NotFound { id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Generated text that could not be turned into a usable code artifact.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedArtifact {
    #[error("{hint} output was empty after sanitization")]
    Empty { hint: String },

    #[error("{hint} output has an unterminated code fence")]
    UnterminatedFence { hint: String },

    #[error("{hint} output still contains fence markers after sanitization")]
    ResidualFence { hint: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retriable() {
        let err = GenerationError::Transient {
            provider: "test".into(),
            message: "HTTP 503".into(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn test_rate_limited_is_retriable() {
        let err = GenerationError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 1500,
        };
        assert!(err.is_retriable());
        assert_eq!(err.retry_after_ms(), Some(1500));
    }

    #[test]
    fn test_permanent_not_retriable() {
        let err = GenerationError::Permanent {
            provider: "test".into(),
            message: "HTTP 400".into(),
        };
        assert!(!err.is_retriable());
        assert_eq!(err.retry_after_ms(), None);
    }

    #[test]
    fn test_zero_retry_after_ignored() {
        let err = GenerationError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 0,
        };
        assert_eq!(err.retry_after_ms(), None);
    }

    #[test]
    fn test_infra_error_display() {
        let err = ExecutionInfraError::new("local", "spawn failed");
        assert_eq!(
            err.to_string(),
            "Executor 'local' infrastructure error: spawn failed"
        );
    }

    #[test]
    fn test_malformed_display() {
        let err = MalformedArtifact::Empty {
            hint: "solution".into(),
        };
        assert_eq!(err.to_string(), "solution output was empty after sanitization");
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<Vec<f32>>("not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
