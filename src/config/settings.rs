//! Application settings and configuration
//!
//! This module provides configuration management for the engine,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::schemas::gemini::models::GEMINI_2_0_FLASH;
use crate::utils::TimeoutConfig;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => anyhow::bail!("Invalid log format: {}. Expected: json or pretty", s),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,
    pub log_format: LogFormat,

    // Provider settings
    pub provider_base_url: Option<String>,
    pub default_model: String,
    /// Used only when a requester has no usable credential
    #[serde(skip_serializing)]
    pub fallback_api_key: Option<String>,

    // Secret sealing
    /// Base64-encoded 32-byte AES-256-GCM key
    #[serde(skip_serializing)]
    pub credential_encryption_key: Option<String>,

    // AWS settings
    pub aws_region: String,
    pub dynamodb_endpoint_url: Option<String>,
    pub dynamodb_credentials_table: String,

    // Engine tuning
    pub attempt_timeout_secs: u64,
    pub validation_timeout_secs: u64,
    pub checkout_lease_secs: u64,
    pub auto_recover_quota: bool,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let settings = Self {
            // App settings
            app_name: env_or_default("APP_NAME", "keypool"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_format: env_or_default("LOG_FORMAT", "json")
                .parse()
                .context("Invalid LOG_FORMAT value")?,

            // Provider settings
            provider_base_url: non_empty_var("PROVIDER_BASE_URL"),
            default_model: env_or_default("DEFAULT_MODEL", GEMINI_2_0_FLASH),
            fallback_api_key: non_empty_var("FALLBACK_API_KEY"),

            credential_encryption_key: non_empty_var("CREDENTIAL_ENCRYPTION_KEY"),

            // AWS settings
            aws_region: env_or_default("AWS_REGION", "us-east-1"),
            dynamodb_endpoint_url: non_empty_var("DYNAMODB_ENDPOINT_URL"),
            dynamodb_credentials_table: env_or_default(
                "DYNAMODB_CREDENTIALS_TABLE",
                "keypool-credentials",
            ),

            // Engine tuning
            attempt_timeout_secs: env_or_default("ATTEMPT_TIMEOUT_SECS", "60")
                .parse()
                .context("Invalid ATTEMPT_TIMEOUT_SECS value")?,
            validation_timeout_secs: env_or_default("VALIDATION_TIMEOUT_SECS", "15")
                .parse()
                .context("Invalid VALIDATION_TIMEOUT_SECS value")?,
            checkout_lease_secs: env_or_default("CHECKOUT_LEASE_SECS", "90")
                .parse()
                .context("Invalid CHECKOUT_LEASE_SECS value")?,
            auto_recover_quota: env_or_default("AUTO_RECOVER_QUOTA", "false")
                .parse()
                .unwrap_or(false),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout_secs == 0 {
            anyhow::bail!("ATTEMPT_TIMEOUT_SECS must be > 0");
        }
        if self.validation_timeout_secs == 0 {
            anyhow::bail!("VALIDATION_TIMEOUT_SECS must be > 0");
        }
        if self.checkout_lease_secs == 0 {
            anyhow::bail!("CHECKOUT_LEASE_SECS must be > 0");
        }
        // A lease that lapses mid-attempt lets a second executor pick the credential
        if self.checkout_lease_secs < self.attempt_timeout_secs {
            anyhow::bail!(
                "CHECKOUT_LEASE_SECS ({}) must be at least ATTEMPT_TIMEOUT_SECS ({})",
                self.checkout_lease_secs,
                self.attempt_timeout_secs
            );
        }
        if self.default_model.trim().is_empty() {
            anyhow::bail!("DEFAULT_MODEL cannot be empty");
        }

        if self.environment == Environment::Production && self.dynamodb_endpoint_url.is_some() {
            tracing::warn!("Running in production against a custom DynamoDB endpoint");
        }

        Ok(())
    }

    /// The sealing key; required by anything that touches the store
    pub fn encryption_key(&self) -> Result<&str> {
        self.credential_encryption_key
            .as_deref()
            .context("CREDENTIAL_ENCRYPTION_KEY is not set")
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::new()
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .with_validation_timeout(Duration::from_secs(self.validation_timeout_secs))
    }

    pub fn checkout_lease(&self) -> Duration {
        Duration::from_secs(self.checkout_lease_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "keypool".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            provider_base_url: None,
            default_model: GEMINI_2_0_FLASH.to_string(),
            fallback_api_key: None,
            credential_encryption_key: None,
            aws_region: "us-east-1".to_string(),
            dynamodb_endpoint_url: None,
            dynamodb_credentials_table: "keypool-credentials".to_string(),
            attempt_timeout_secs: 60,
            validation_timeout_secs: 15,
            checkout_lease_secs: 90,
            auto_recover_quota: false,
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
