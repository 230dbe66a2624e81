//! Application wiring
//!
//! Builds the store, selector, executor and lifecycle API from settings.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{create_dynamodb_client, Settings};
use crate::db::{
    AesGcmCipher, CredentialRepository, CredentialStore, DynamoDbClient,
    DynamoDbCredentialRepository,
};
use crate::error::PoolError;
use crate::services::{
    AdmissionValidator, ExecutorConfig, FailoverExecutor, GeminiProvider, GeminiProviderConfig,
    GenerateOptions, Generation, GenerativeProvider, LifecycleApi, PoolConfig, PoolSelector,
};

/// Fully wired engine
pub struct App {
    settings: Arc<Settings>,
    dynamodb: Option<Arc<DynamoDbClient>>,
    executor: FailoverExecutor,
    lifecycle: LifecycleApi,
}

impl App {
    /// DynamoDB-backed store and the Gemini provider
    pub async fn new(settings: Settings) -> Result<Self> {
        let settings = Arc::new(settings);

        tracing::debug!(
            region = %settings.aws_region,
            dynamodb_endpoint = ?settings.dynamodb_endpoint_url,
            table = %settings.dynamodb_credentials_table,
            "Creating DynamoDB client"
        );
        let sdk_client = create_dynamodb_client(&settings).await;
        let dynamodb = Arc::new(DynamoDbClient::new(settings.clone(), sdk_client));
        let repository = Arc::new(DynamoDbCredentialRepository::new(dynamodb.clone()));

        let mut provider_config = GeminiProviderConfig::default()
            .with_timeout(settings.attempt_timeout_secs.max(settings.validation_timeout_secs));
        provider_config.connect_timeout_seconds = settings.timeouts().connect_timeout.as_secs();
        if let Some(base_url) = &settings.provider_base_url {
            provider_config = provider_config.with_base_url(base_url);
        }
        let provider = Arc::new(
            GeminiProvider::new(provider_config).context("Failed to build Gemini provider")?,
        );

        let mut app = Self::from_parts(settings, repository, provider)?;
        app.dynamodb = Some(dynamodb);
        Ok(app)
    }

    /// Wire the engine over an arbitrary repository and provider
    pub fn from_parts(
        settings: Arc<Settings>,
        repository: Arc<dyn CredentialRepository>,
        provider: Arc<dyn GenerativeProvider>,
    ) -> Result<Self> {
        let cipher = AesGcmCipher::from_base64(settings.encryption_key()?)
            .context("Invalid CREDENTIAL_ENCRYPTION_KEY")?;
        let store = CredentialStore::new(repository, Arc::new(cipher));

        let mut pool_config = PoolConfig::new().with_auto_recover_quota(settings.auto_recover_quota);
        if let Some(fallback) = &settings.fallback_api_key {
            pool_config = pool_config.with_fallback_secret(fallback.as_str());
        }

        let timeouts = settings.timeouts();
        let executor = FailoverExecutor::new(
            PoolSelector::new(store.clone(), pool_config),
            provider.clone(),
            ExecutorConfig::default()
                .with_default_model(settings.default_model.clone())
                .with_attempt_timeout(timeouts.attempt_timeout)
                .with_checkout_lease(settings.checkout_lease()),
        );
        let lifecycle = LifecycleApi::new(
            store,
            AdmissionValidator::new(provider, timeouts.validation_timeout),
        );

        tracing::info!(
            app_name = %settings.app_name,
            environment = %settings.environment,
            default_model = %settings.default_model,
            fallback = settings.fallback_api_key.is_some(),
            auto_recover_quota = settings.auto_recover_quota,
            "Engine initialized"
        );

        Ok(Self {
            settings,
            dynamodb: None,
            executor,
            lifecycle,
        })
    }

    /// Generate text for a prompt using the requester's pool
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        requester_id: &str,
    ) -> Result<Generation, PoolError> {
        self.executor.execute(prompt, options, requester_id).await
    }

    pub fn lifecycle(&self) -> &LifecycleApi {
        &self.lifecycle
    }

    pub fn executor(&self) -> &FailoverExecutor {
        &self.executor
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Backing table reachable; always true for non-DynamoDB stores
    pub async fn health_check(&self) -> bool {
        match &self.dynamodb {
            Some(dynamodb) => dynamodb.health_check().await,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCredentialRepository;
    use crate::services::backend_pool::testing::{Behaviour, FakeProvider};
    use crate::services::{AddCredentialRequest, Requester};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn settings() -> Settings {
        Settings {
            credential_encryption_key: Some(STANDARD.encode([3u8; 32])),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_add_then_generate() {
        let provider = FakeProvider::new()
            .with("AIza-1", Behaviour::Succeed("weekly plan".into()))
            .into_arc();
        let app = App::from_parts(
            Arc::new(settings()),
            Arc::new(InMemoryCredentialRepository::new()),
            provider,
        )
        .unwrap();

        app.lifecycle()
            .add(AddCredentialRequest::new("AIza-1", "main"), &Requester::user("alice"))
            .await
            .unwrap();

        let generation = app
            .generate("plan", &GenerateOptions::default(), "alice")
            .await
            .unwrap();
        assert_eq!(generation.text, "weekly plan");
        assert_eq!(generation.model, "gemini-2.0-flash");
        assert!(app.health_check().await);
    }

    #[tokio::test]
    async fn test_fallback_from_settings() {
        let provider = FakeProvider::new()
            .with("env-key", Behaviour::Succeed("from env".into()))
            .into_arc();
        let settings = Settings {
            fallback_api_key: Some("env-key".to_string()),
            ..settings()
        };
        let app = App::from_parts(
            Arc::new(settings),
            Arc::new(InMemoryCredentialRepository::new()),
            provider,
        )
        .unwrap();

        let generation = app
            .generate("hi", &GenerateOptions::default(), "nobody")
            .await
            .unwrap();
        assert_eq!(generation.text, "from env");
    }

    #[test]
    fn test_missing_encryption_key_is_fatal() {
        let result = App::from_parts(
            Arc::new(Settings::default()),
            Arc::new(InMemoryCredentialRepository::new()),
            FakeProvider::new().into_arc(),
        );
        assert!(result.is_err());
    }
}
