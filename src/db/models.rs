//! Credential data model
//!
//! This module defines the credential record, its lifecycle status, the
//! partial-update patch the engine writes, and the DynamoDB item mapping.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::cipher::EncryptedSecret;

// ============================================================================
// Credential Status
// ============================================================================

/// Health status of a pooled credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Not yet validated against the provider
    #[default]
    Testing,
    /// Eligible for selection
    Active,
    /// Provider reported quota or rate limiting
    QuotaExceeded,
    RateLimited,
    /// Provider rejected the credential itself; terminal until reset
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Active => "active",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "testing" => Ok(Self::Testing),
            "active" => Ok(Self::Active),
            "quota_exceeded" => Ok(Self::QuotaExceeded),
            "rate_limited" => Ok(Self::RateLimited),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown credential status: {other}")),
        }
    }
}

// ============================================================================
// Credential
// ============================================================================

/// A provider API key plus its ownership and health state.
///
/// The secret is only ever held sealed; see [`crate::db::CredentialStore::decrypt_secret`].
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,

    /// Sealed provider secret
    pub secret: EncryptedSecret,

    /// Human-readable name
    pub label: String,

    /// Provider this credential authenticates to (e.g. "gemini")
    pub provider: String,

    /// Owner; `None` marks a legacy ownerless credential, treated as shared
    pub owner_id: Option<String>,

    /// Explicitly shared with every requester
    pub is_global: bool,

    /// Gate independent of `status`; cleared on revocation
    pub is_active: bool,

    pub status: CredentialStatus,

    /// Successful generations served
    pub usage_count: u64,

    pub last_used_at: Option<DateTime<Utc>>,

    /// Failed attempts since the last reset
    pub error_count: u64,

    pub last_error: Option<String>,

    /// Provider hint for when a quota might clear
    pub reset_at: Option<DateTime<Utc>>,

    /// Checkout lease held by an in-flight attempt
    pub leased_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Shared credentials are visible to every requester's pool
    pub fn is_shared(&self) -> bool {
        self.is_global || self.owner_id.is_none()
    }

    pub fn is_owned_by(&self, requester_id: &str) -> bool {
        self.owner_id.as_deref() == Some(requester_id)
    }

    /// Selectable right now: healthy status and the active gate open
    pub fn is_usable(&self) -> bool {
        self.status == CredentialStatus::Active && self.is_active
    }

    /// Quota-limited but past its reset hint
    pub fn is_recoverable(&self, now: DateTime<Utc>) -> bool {
        self.status == CredentialStatus::QuotaExceeded
            && self.is_active
            && self.reset_at.is_some_and(|reset_at| reset_at <= now)
    }

    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.leased_until.is_some_and(|until| until > now)
    }

    /// Read-side projection without secret material
    pub fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id.clone(),
            label: self.label.clone(),
            provider: self.provider.clone(),
            owner_id: self.owner_id.clone(),
            is_global: self.is_global,
            is_active: self.is_active,
            status: self.status,
            usage_count: self.usage_count,
            last_used_at: self.last_used_at,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            reset_at: self.reset_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &HashMap<String, AttributeValue>) -> Option<Self> {
        let secret = EncryptedSecret::from_base64(
            &get_string(item, "secret_ciphertext")?,
            &get_string(item, "secret_nonce")?,
        )
        .ok()?;

        Some(Self {
            id: get_string(item, "id")?,
            secret,
            label: get_string(item, "label").unwrap_or_default(),
            provider: get_string(item, "provider").unwrap_or_else(|| "gemini".to_string()),
            owner_id: get_string(item, "owner_id"),
            is_global: get_bool(item, "is_global").unwrap_or(false),
            is_active: get_bool(item, "is_active").unwrap_or(false),
            status: get_string(item, "status")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            usage_count: get_number(item, "usage_count").unwrap_or(0),
            last_used_at: get_timestamp(item, "last_used_at"),
            error_count: get_number(item, "error_count").unwrap_or(0),
            last_error: get_string(item, "last_error"),
            reset_at: get_timestamp(item, "reset_at"),
            leased_until: get_timestamp(item, "leased_until"),
            created_at: get_timestamp(item, "created_at").unwrap_or_else(Utc::now),
            updated_at: get_timestamp(item, "updated_at"),
        })
    }

    /// Convert to DynamoDB item
    pub fn to_dynamodb(&self) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S(self.id.clone()));
        item.insert(
            "secret_ciphertext".to_string(),
            AttributeValue::S(self.secret.ciphertext_base64()),
        );
        item.insert(
            "secret_nonce".to_string(),
            AttributeValue::S(self.secret.nonce_base64()),
        );
        item.insert("label".to_string(), AttributeValue::S(self.label.clone()));
        item.insert("provider".to_string(), AttributeValue::S(self.provider.clone()));
        if let Some(owner_id) = &self.owner_id {
            item.insert("owner_id".to_string(), AttributeValue::S(owner_id.clone()));
        }
        item.insert("is_global".to_string(), AttributeValue::Bool(self.is_global));
        item.insert("is_active".to_string(), AttributeValue::Bool(self.is_active));
        item.insert(
            "status".to_string(),
            AttributeValue::S(self.status.as_str().to_string()),
        );
        item.insert(
            "usage_count".to_string(),
            AttributeValue::N(self.usage_count.to_string()),
        );
        item.insert(
            "error_count".to_string(),
            AttributeValue::N(self.error_count.to_string()),
        );
        if let Some(last_error) = &self.last_error {
            item.insert("last_error".to_string(), AttributeValue::S(last_error.clone()));
        }
        for (key, value) in [
            ("last_used_at", self.last_used_at),
            ("reset_at", self.reset_at),
            ("leased_until", self.leased_until),
            ("created_at", Some(self.created_at)),
            ("updated_at", self.updated_at),
        ] {
            if let Some(ts) = value {
                item.insert(key.to_string(), timestamp_value(ts));
            }
        }
        item
    }
}

// ============================================================================
// Credential View
// ============================================================================

/// What administrative reads return. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialView {
    pub id: String,
    pub label: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub is_global: bool,
    pub is_active: bool,
    pub status: CredentialStatus,
    pub usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// New Credential
// ============================================================================

/// Attributes of a credential about to be saved; the secret travels separately
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub label: String,
    pub provider: String,
    pub owner_id: Option<String>,
    pub is_global: bool,
    pub status: CredentialStatus,
    pub is_active: bool,
}

impl NewCredential {
    /// A credential that has passed admission
    pub fn admitted(
        label: impl Into<String>,
        provider: impl Into<String>,
        owner_id: Option<String>,
        is_global: bool,
    ) -> Self {
        Self {
            label: label.into(),
            provider: provider.into(),
            owner_id,
            is_global,
            status: CredentialStatus::Active,
            is_active: true,
        }
    }
}

// ============================================================================
// Credential Patch
// ============================================================================

/// Which checkout lease an update clears
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeaseRelease {
    #[default]
    Keep,
    /// Whatever lease is present
    Any,
    /// Only the lease ending at this instant; a lease taken over by
    /// another executor is left alone
    Held(DateTime<Utc>),
}

/// Targeted partial update.
///
/// Counters move through increments so repositories can apply them
/// atomically. `error_count` (absolute) and `error_increment` are never
/// both set by the constructors below.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPatch {
    pub status: Option<CredentialStatus>,
    pub is_active: Option<bool>,
    pub usage_increment: u64,
    pub error_increment: u64,
    pub error_count: Option<u64>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reset_at: Option<DateTime<Utc>>,
    pub lease: LeaseRelease,
}

impl CredentialPatch {
    /// A generation succeeded: the credential reads healthy again
    pub fn success(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(CredentialStatus::Active),
            usage_increment: 1,
            last_used_at: Some(now),
            ..Default::default()
        }
    }

    pub fn quota_exceeded(error: impl Into<String>, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: Some(CredentialStatus::QuotaExceeded),
            error_increment: 1,
            last_error: Some(error.into()),
            reset_at,
            ..Default::default()
        }
    }

    pub fn revoked(error: impl Into<String>) -> Self {
        Self {
            status: Some(CredentialStatus::Revoked),
            is_active: Some(false),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn transient_failure(error: impl Into<String>) -> Self {
        Self {
            error_increment: 1,
            last_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Administrative reset. Keeps `last_error` and `usage_count`.
    pub fn reset() -> Self {
        Self {
            status: Some(CredentialStatus::Active),
            is_active: Some(true),
            error_count: Some(0),
            lease: LeaseRelease::Any,
            ..Default::default()
        }
    }

    /// Release the lease ending at `held`, if the caller took one
    pub fn releasing_lease(mut self, held: Option<DateTime<Utc>>) -> Self {
        if let Some(until) = held {
            self.lease = LeaseRelease::Held(until);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to an in-memory record
    pub fn apply(&self, credential: &mut Credential, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            credential.status = status;
        }
        if let Some(is_active) = self.is_active {
            credential.is_active = is_active;
        }
        if let Some(count) = self.error_count {
            credential.error_count = count;
        }
        credential.error_count = credential.error_count.saturating_add(self.error_increment);
        credential.usage_count = credential.usage_count.saturating_add(self.usage_increment);
        if let Some(ts) = self.last_used_at {
            credential.last_used_at = Some(ts);
        }
        if let Some(error) = &self.last_error {
            credential.last_error = Some(error.clone());
        }
        if let Some(ts) = self.reset_at {
            credential.reset_at = Some(ts);
        }
        match self.lease {
            LeaseRelease::Keep => {}
            LeaseRelease::Any => credential.leased_until = None,
            LeaseRelease::Held(until) if credential.leased_until == Some(until) => {
                credential.leased_until = None
            }
            LeaseRelease::Held(_) => {}
        }
        credential.updated_at = Some(now);
    }
}

// ============================================================================
// DynamoDB Helpers
// ============================================================================

pub(crate) fn timestamp_value(ts: DateTime<Utc>) -> AttributeValue {
    AttributeValue::N(ts.timestamp_millis().to_string())
}

fn get_string(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

fn get_number(item: &HashMap<String, AttributeValue>, key: &str) -> Option<u64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn get_bool(item: &HashMap<String, AttributeValue>, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}

fn get_timestamp(item: &HashMap<String, AttributeValue>, key: &str) -> Option<DateTime<Utc>> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}
