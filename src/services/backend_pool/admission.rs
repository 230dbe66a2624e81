//! Admission probe
//!
//! A new secret joins the pool only after a live model-listing call
//! succeeds with it. Any error, timeout or empty listing rejects it.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;
use crate::services::provider::GenerativeProvider;
use crate::utils::{bound_error_text, with_timeout, TimeoutError};

#[derive(Clone)]
pub struct AdmissionValidator {
    provider: Arc<dyn GenerativeProvider>,
    timeout: Duration,
}

impl AdmissionValidator {
    pub fn new(provider: Arc<dyn GenerativeProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Name of the provider secrets are validated against
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn validate(&self, secret: &str) -> Result<(), PoolError> {
        match with_timeout(self.timeout, self.provider.list_models(secret)).await {
            Ok(models) if models.is_empty() => {
                tracing::info!("Admission probe returned no models");
                Err(PoolError::ValidationFailed(
                    "provider returned no available models".to_string(),
                ))
            }
            Ok(models) => {
                tracing::debug!(model_count = models.len(), "Admission probe passed");
                Ok(())
            }
            Err(TimeoutError::Timeout(elapsed)) => {
                tracing::info!(timeout_ms = elapsed.as_millis() as u64, "Admission probe timed out");
                Err(PoolError::ValidationFailed(format!(
                    "validation timed out after {}s",
                    elapsed.as_secs_f32()
                )))
            }
            Err(TimeoutError::Inner(e)) => {
                tracing::info!(classification = %e.classify(), "Admission probe rejected");
                Err(PoolError::ValidationFailed(bound_error_text(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend_pool::testing::{Behaviour, FakeProvider};

    fn validator(provider: FakeProvider, timeout: Duration) -> AdmissionValidator {
        AdmissionValidator::new(provider.into_arc(), timeout)
    }

    #[tokio::test]
    async fn test_working_key_is_admitted() {
        let v = validator(
            FakeProvider::new().with("good", Behaviour::Succeed("ok".into())),
            Duration::from_secs(1),
        );
        assert!(v.validate("good").await.is_ok());
        assert_eq!(v.provider_name(), "gemini");
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let v = validator(FakeProvider::new(), Duration::from_secs(1));
        let err = v.validate("unknown").await.unwrap_err();
        assert!(matches!(err, PoolError::ValidationFailed(ref m) if m.contains("API key not valid")));
    }

    #[tokio::test]
    async fn test_quota_limited_key_is_not_admitted() {
        let v = validator(
            FakeProvider::new().with("busy", Behaviour::Quota { retry_after: None }),
            Duration::from_secs(1),
        );
        assert!(matches!(v.validate("busy").await, Err(PoolError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_empty_listing_fails_closed() {
        let v = validator(
            FakeProvider::new().with("hollow", Behaviour::EmptyListing),
            Duration::from_secs(1),
        );
        let err = v.validate("hollow").await.unwrap_err();
        assert!(err.to_string().contains("no available models"));
    }

    #[tokio::test]
    async fn test_timeout_fails_closed() {
        let v = validator(
            FakeProvider::new().with("slow", Behaviour::Hang),
            Duration::from_millis(20),
        );
        let err = v.validate("slow").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
