//! Timeout budgets for provider calls
//!
//! Every provider call the engine makes runs under one of these budgets.

use std::time::Duration;

/// Timeout configuration for the engine's provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Bound on a single generation attempt (default: 60s)
    pub attempt_timeout: Duration,

    /// Bound on an admission probe (default: 15s)
    pub validation_timeout: Duration,

    /// Connection timeout for the HTTP client (default: 10s)
    pub connect_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(60),
            validation_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }
}

/// Apply timeout to an async operation
///
/// The inner error is preserved; elapsed budgets surface as [`TimeoutError::Timeout`].
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Collapse into the inner error type, mapping an elapsed budget with `on_timeout`
    pub fn flatten(self, on_timeout: impl FnOnce(Duration) -> E) -> E {
        match self {
            TimeoutError::Inner(e) => e,
            TimeoutError::Timeout(d) => on_timeout(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = TimeoutConfig::default();
        assert_eq!(config.attempt_timeout, Duration::from_secs(60));
        assert_eq!(config.validation_timeout, Duration::from_secs(15));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_overrides_one_budget() {
        let config = TimeoutConfig::new().with_attempt_timeout(Duration::from_secs(5));
        assert_eq!(config.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.validation_timeout, TimeoutConfig::default().validation_timeout);
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let err = with_timeout(Duration::from_secs(1), async { Err::<(), _>("quota") })
            .await
            .unwrap_err();

        assert!(matches!(err, TimeoutError::Inner(_)));
        assert_eq!(err.flatten(|_| "timeout"), "quota");
    }

    #[tokio::test]
    async fn test_elapsed_budget_is_reported() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, String>("late")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TimeoutError::Timeout(d) if d == Duration::from_millis(10)));
        assert_eq!(
            err.flatten(|d| format!("gave up after {}ms", d.as_millis())),
            "gave up after 10ms"
        );
    }
}
