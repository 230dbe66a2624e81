//! Scripted provider and store fixtures for engine tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::{
    AesGcmCipher, Credential, CredentialPatch, CredentialStore, InMemoryCredentialRepository,
    NewCredential,
};
use crate::services::provider::{GenerativeProvider, ProviderError};

/// What the fake provider does for a given secret
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Generation returns this text; model listing succeeds
    Succeed(String),
    Quota { retry_after: Option<Duration> },
    AuthInvalid,
    /// Any other failure, e.g. a 500
    Fail(String),
    /// Never completes
    Hang,
    /// Model listing succeeds with no models
    EmptyListing,
}

/// In-process provider keyed by secret. Unknown secrets are rejected as invalid keys.
#[derive(Default)]
pub struct FakeProvider {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, secret: &str, behaviour: Behaviour) -> Self {
        self.set(secret, behaviour);
        self
    }

    pub fn set(&self, secret: &str, behaviour: Behaviour) {
        self.behaviours
            .lock()
            .unwrap()
            .insert(secret.to_string(), behaviour);
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Secrets passed to `generate`, in call order
    pub fn generate_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    /// Models passed to `generate`, in call order
    pub fn models_requested(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    fn behaviour(&self, secret: &str) -> Behaviour {
        self.behaviours
            .lock()
            .unwrap()
            .get(secret)
            .cloned()
            .unwrap_or(Behaviour::AuthInvalid)
    }
}

fn quota_error(retry_after: Option<Duration>) -> ProviderError {
    ProviderError::ApiError {
        status: 429,
        status_text: Some("RESOURCE_EXHAUSTED".to_string()),
        reason: None,
        message: "Resource has been exhausted (e.g. check quota).".to_string(),
        retry_after,
    }
}

fn invalid_key_error() -> ProviderError {
    ProviderError::ApiError {
        status: 400,
        status_text: Some("INVALID_ARGUMENT".to_string()),
        reason: Some("API_KEY_INVALID".to_string()),
        message: "API key not valid. Please pass a valid API key.".to_string(),
        retry_after: None,
    }
}

#[async_trait]
impl GenerativeProvider for FakeProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, secret: &str, model: &str, _prompt: &str) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((secret.to_string(), model.to_string()));

        match self.behaviour(secret) {
            Behaviour::Succeed(text) => Ok(text),
            Behaviour::Quota { retry_after } => Err(quota_error(retry_after)),
            Behaviour::AuthInvalid => Err(invalid_key_error()),
            Behaviour::Fail(message) => Err(ProviderError::api(500, message_or_default(message))),
            Behaviour::EmptyListing => Err(ProviderError::EmptyResponse("STOP".to_string())),
            Behaviour::Hang => std::future::pending().await,
        }
    }

    async fn list_models(&self, secret: &str) -> Result<Vec<String>, ProviderError> {
        match self.behaviour(secret) {
            Behaviour::Succeed(_) => Ok(vec!["gemini-2.0-flash".to_string()]),
            Behaviour::EmptyListing => Ok(Vec::new()),
            Behaviour::Quota { retry_after } => Err(quota_error(retry_after)),
            Behaviour::AuthInvalid => Err(invalid_key_error()),
            Behaviour::Fail(message) => Err(ProviderError::api(500, message)),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

fn message_or_default(message: String) -> String {
    if message.is_empty() {
        "Internal error".to_string()
    } else {
        message
    }
}

pub fn test_store() -> CredentialStore {
    CredentialStore::new(
        Arc::new(InMemoryCredentialRepository::new()),
        Arc::new(AesGcmCipher::new([7u8; 32])),
    )
}

/// Save an admitted credential, optionally back-dating its last use
pub async fn seed(
    store: &CredentialStore,
    secret: &str,
    owner: Option<&str>,
    is_global: bool,
    last_used_at: Option<DateTime<Utc>>,
) -> Credential {
    let saved = store
        .save(
            NewCredential::admitted(secret, "gemini", owner.map(str::to_string), is_global),
            secret,
        )
        .await
        .unwrap();

    match last_used_at {
        Some(ts) => {
            let patch = CredentialPatch {
                last_used_at: Some(ts),
                ..Default::default()
            };
            store.update_fields(&saved.id, &patch).await.unwrap().unwrap()
        }
        None => saved,
    }
}

pub async fn reload(store: &CredentialStore, credential: &Credential) -> Credential {
    store.find_by_id(&credential.id).await.unwrap().unwrap()
}
