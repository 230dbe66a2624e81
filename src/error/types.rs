//! Engine error types

use thiserror::Error;

use crate::db::{CryptoError, StoreError};

/// Outcomes that reach callers of the engine.
///
/// Per-candidate provider failures never appear here directly: they are
/// absorbed into credential state transitions and only surface, aggregated,
/// as [`PoolError::PoolExhausted`].
#[derive(Error, Debug)]
pub enum PoolError {
    /// The admission probe rejected the secret. Nothing was persisted.
    #[error("Credential failed validation: {0}")]
    ValidationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No credentials available")]
    NoCredentialsAvailable,

    /// Every candidate, including the fallback secret, failed.
    #[error("All {attempts} credential attempts failed; last error: {last_error}")]
    PoolExhausted { attempts: usize, last_error: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl PoolError {
    /// Stable machine-readable kind, used by the CLI's JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::ValidationFailed(_) => "validation_failed",
            PoolError::InvalidRequest(_) => "invalid_request",
            PoolError::NoCredentialsAvailable => "no_credentials_available",
            PoolError::PoolExhausted { .. } => "pool_exhausted",
            PoolError::Unauthorized(_) => "unauthorized",
            PoolError::NotFound(_) => "not_found",
            PoolError::Store(_) => "store_error",
            PoolError::Crypto(_) => "crypto_error",
        }
    }

    /// Whether the error was caused by the caller rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PoolError::ValidationFailed(_)
                | PoolError::InvalidRequest(_)
                | PoolError::Unauthorized(_)
                | PoolError::NotFound(_)
        )
    }
}

impl From<validator::ValidationErrors> for PoolError {
    fn from(errors: validator::ValidationErrors) -> Self {
        PoolError::InvalidRequest(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_carries_last_error() {
        let err = PoolError::PoolExhausted {
            attempts: 2,
            last_error: "API error: 429 - quota".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "All 2 credential attempts failed; last error: API error: 429 - quota"
        );
        assert_eq!(err.kind(), "pool_exhausted");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_admin_errors_are_client_errors() {
        assert!(PoolError::Unauthorized("x".into()).is_client_error());
        assert!(PoolError::NotFound("x".into()).is_client_error());
        assert!(PoolError::ValidationFailed("x".into()).is_client_error());
    }
}
