//! Provider abstraction
//!
//! The engine talks to the generative-AI service only through
//! [`GenerativeProvider`]. Provider failures are classified into the
//! three buckets that drive credential state transitions.

mod gemini;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use gemini::{GeminiProvider, GeminiProviderConfig};

// ============================================================================
// Provider Trait
// ============================================================================

/// A generative-AI backend reachable with a single API key
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Provider identifier stored on credentials (e.g. "gemini")
    fn name(&self) -> &str;

    /// Generate text for a prompt
    async fn generate(&self, secret: &str, model: &str, prompt: &str) -> Result<String, ProviderError>;

    /// List the models the key can reach; used as a cheap admission probe
    async fn list_models(&self, secret: &str) -> Result<Vec<String>, ProviderError>;
}

// ============================================================================
// Error Types
// ============================================================================

/// How a provider failure affects the credential that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate or quota limiting
    Quota,
    /// The credential itself is invalid
    AuthInvalid,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quota => write!(f, "quota"),
            Self::AuthInvalid => write!(f, "auth_invalid"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Errors that can occur when calling a provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        /// Provider status string, e.g. "RESOURCE_EXHAUSTED"
        status_text: Option<String>,
        /// Machine-readable reason, e.g. "API_KEY_INVALID"
        reason: Option<String>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Provider returned no content: {0}")]
    EmptyResponse(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
}

const QUOTA_STATUSES: &[&str] = &["RESOURCE_EXHAUSTED"];
const AUTH_STATUSES: &[&str] = &["UNAUTHENTICATED", "PERMISSION_DENIED"];
const AUTH_REASONS: &[&str] = &[
    "API_KEY_INVALID",
    "API_KEY_EXPIRED",
    "API_KEY_SERVICE_BLOCKED",
    "CONSUMER_SUSPENDED",
];
const AUTH_MESSAGES: &[&str] = &["api key not valid", "api key expired", "invalid api key"];

impl ProviderError {
    /// API error with just a status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            status_text: None,
            reason: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classify into the transition bucket
    pub fn classify(&self) -> ErrorClass {
        let Self::ApiError {
            status,
            status_text,
            reason,
            message,
            ..
        } = self
        else {
            return ErrorClass::Other;
        };

        let message = message.to_lowercase();
        let status_text = status_text.as_deref().unwrap_or_default();
        let reason = reason.as_deref().unwrap_or_default();

        if *status == 429
            || QUOTA_STATUSES.contains(&status_text)
            || message.contains("quota")
            || message.contains("rate limit")
        {
            return ErrorClass::Quota;
        }

        if matches!(status, 401 | 403)
            || AUTH_STATUSES.contains(&status_text)
            || AUTH_REASONS.contains(&reason)
            || AUTH_MESSAGES.iter().any(|m| message.contains(m))
        {
            return ErrorClass::AuthInvalid;
        }

        ErrorClass::Other
    }

    /// Provider-suggested wait before the credential is usable again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ApiError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_error(status: u16, status_text: &str, reason: Option<&str>, message: &str) -> ProviderError {
        ProviderError::ApiError {
            status,
            status_text: Some(status_text.to_string()),
            reason: reason.map(str::to_string),
            message: message.to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_quota_classification() {
        assert_eq!(ProviderError::api(429, "Too Many Requests").classify(), ErrorClass::Quota);
        assert_eq!(
            gemini_error(429, "RESOURCE_EXHAUSTED", None, "Resource has been exhausted (e.g. check quota).")
                .classify(),
            ErrorClass::Quota
        );
        assert_eq!(
            ProviderError::api(400, "You exceeded your current quota").classify(),
            ErrorClass::Quota
        );
    }

    #[test]
    fn test_auth_classification() {
        assert_eq!(
            gemini_error(400, "INVALID_ARGUMENT", Some("API_KEY_INVALID"), "API key not valid. Please pass a valid API key.")
                .classify(),
            ErrorClass::AuthInvalid
        );
        assert_eq!(
            gemini_error(403, "PERMISSION_DENIED", None, "Your API key was reported as leaked.").classify(),
            ErrorClass::AuthInvalid
        );
        assert_eq!(ProviderError::api(401, "unauthorized").classify(), ErrorClass::AuthInvalid);
    }

    #[test]
    fn test_other_classification() {
        assert_eq!(ProviderError::api(500, "Internal error").classify(), ErrorClass::Other);
        assert_eq!(
            gemini_error(400, "INVALID_ARGUMENT", None, "Unknown name \"foo\"").classify(),
            ErrorClass::Other
        );
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).classify(),
            ErrorClass::Other
        );
        assert_eq!(ProviderError::ParseError("bad json".into()).classify(), ErrorClass::Other);
    }

    #[test]
    fn test_retry_after() {
        let err = ProviderError::ApiError {
            status: 429,
            status_text: None,
            reason: None,
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ProviderError::api(500, "x").retry_after(), None);
    }
}
