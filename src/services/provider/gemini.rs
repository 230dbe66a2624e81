//! Gemini provider
//!
//! Text generation and model listing against the Google Gemini REST API.
//! The key travels per call; this type holds no credentials of its own.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{GenerativeProvider, ProviderError};
use crate::schemas::gemini::{GeminiError, GeminiRequest, GeminiResponse, ListModelsResponse};

// ============================================================================
// Constants
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER_NAME: &str = "gemini";

const MODELS_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiProviderConfig {
    /// Base URL (default: generativelanguage.googleapis.com)
    pub base_url: Option<String>,

    /// HTTP-level request timeout in seconds
    pub timeout_seconds: u64,

    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
}

impl Default for GeminiProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: 120,
            connect_timeout_seconds: 10,
        }
    }
}

impl GeminiProviderConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

// ============================================================================
// Gemini Provider
// ============================================================================

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| GEMINI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        tracing::info!(base_url = %base_url, "Initialized Gemini provider");

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Turn a non-2xx response into a classified-ready error
    async fn api_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<GeminiError>(&body) {
            Ok(gemini_error) => {
                let detail = gemini_error.error;
                let retry_after =
                    retry_after.or_else(|| detail.retry_delay_secs().map(Duration::from_secs));
                ProviderError::ApiError {
                    status: status.as_u16(),
                    status_text: (!detail.status.is_empty()).then(|| detail.status.clone()),
                    reason: detail.reason().map(str::to_string),
                    message: detail.message,
                    retry_after,
                }
            }
            Err(_) => ProviderError::ApiError {
                status: status.as_u16(),
                status_text: None,
                reason: None,
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body
                },
                retry_after,
            },
        }
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(&self, secret: &str, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        tracing::debug!(model = %model, "Calling Gemini generateContent API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", secret)
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Gemini response");
            ProviderError::ParseError(e.to_string())
        })?;

        parsed.text().ok_or_else(|| {
            ProviderError::EmptyResponse(
                parsed
                    .finish_reason()
                    .unwrap_or("no candidates")
                    .to_string(),
            )
        })
    }

    async fn list_models(&self, secret: &str) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", secret)
            .query(&[("pageSize", MODELS_PAGE_SIZE)])
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            let listing: ListModelsResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;

            return Ok(listing
                .models
                .into_iter()
                .map(|m| m.name.strip_prefix("models/").unwrap_or(&m.name).to_string())
                .collect());
        }

        Err(Self::api_error(response).await)
    }
}

/// `Retry-After` as delta-seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::ErrorClass;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(GeminiProviderConfig::default().with_base_url(server.uri())).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = GeminiProviderConfig::default().with_timeout(30);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.base_url.is_none());

        let provider = GeminiProvider::new(config).unwrap();
        assert_eq!(provider.base_url(), GEMINI_API_BASE);
        assert_eq!(provider.name(), "gemini");
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "key-1"))
            .and(body_partial_json(json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "hello"}]}, "finishReason": "STOP"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server)
            .generate("key-1", "models/gemini-2.0-flash", "hi")
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_generate_quota_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "42")
                    .set_body_json(json!({
                        "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
                    })),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("key-1", "gemini-2.0-flash", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Quota);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
    }

    #[tokio::test]
    async fn test_generate_invalid_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("bad", "gemini-2.0-flash", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::AuthInvalid);
        match err {
            ProviderError::ApiError { reason, status_text, .. } => {
                assert_eq!(reason.as_deref(), Some("API_KEY_INVALID"));
                assert_eq!(status_text.as_deref(), Some("INVALID_ARGUMENT"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_server_error_is_other() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("key-1", "gemini-2.0-flash", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Other);
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_generate_blocked_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": [{"finishReason": "SAFETY"}]})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("key-1", "gemini-2.0-flash", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse(ref r) if r == "SAFETY"));
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("x-goog-api-key", "key-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash"},
                    {"name": "models/gemini-1.5-pro"}
                ]
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models("key-1").await.unwrap();
        assert_eq!(models, vec!["gemini-2.0-flash", "gemini-1.5-pro"]);
    }

    #[tokio::test]
    async fn test_list_models_quota_uses_retry_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Quota exceeded",
                    "status": "RESOURCE_EXHAUSTED",
                    "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "12s"}]
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).list_models("key-1").await.unwrap_err();
        assert_eq!(err.classify(), ErrorClass::Quota);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "17".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(17)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }
}
