//! DynamoDB client wrapper
//!
//! This module provides a wrapper around the AWS DynamoDB SDK client
//! carrying the table layout the credential repository relies on.

use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use crate::config::Settings;
use std::sync::Arc;

/// Global secondary index on `owner_id` used by owned-credential queries
pub const OWNER_INDEX: &str = "owner_id-index";

/// DynamoDB client wrapper for database operations.
#[derive(Clone)]
pub struct DynamoDbClient {
    /// Application settings
    settings: Arc<Settings>,

    /// AWS DynamoDB SDK client
    client: DynamoDbSdkClient,
}

impl DynamoDbClient {
    /// Create a new DynamoDB client.
    pub fn new(settings: Arc<Settings>, client: DynamoDbSdkClient) -> Self {
        Self { settings, client }
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn client(&self) -> &DynamoDbSdkClient {
        &self.client
    }

    /// Get the credentials table name
    pub fn credentials_table(&self) -> &str {
        &self.settings.dynamodb_credentials_table
    }

    /// Get the owner index name
    pub fn owner_index(&self) -> &str {
        OWNER_INDEX
    }

    /// Check if the DynamoDB connection is healthy
    ///
    /// Describes the credentials table to verify connectivity and existence.
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .describe_table()
            .table_name(self.credentials_table())
            .send()
            .await
        {
            Ok(_) => {
                tracing::debug!("DynamoDB health check passed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "DynamoDB health check failed");
                false
            }
        }
    }
}
