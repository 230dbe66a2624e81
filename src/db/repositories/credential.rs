//! Credential repository
//!
//! DynamoDB data access for the credential collection. Mutations are
//! targeted `update_item` expressions; counters use `ADD` so concurrent
//! executors never lose increments.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::{CredentialRepository, StoreError};
use crate::db::models::{
    timestamp_value, Credential, CredentialPatch, CredentialStatus, LeaseRelease,
};
use crate::db::DynamoDbClient;

type Item = HashMap<String, AttributeValue>;

const SHARED_FILTER: &str = "(is_global = :true OR attribute_not_exists(owner_id))";
const USABLE_FILTER: &str = "#status = :active AND is_active = :true";

/// Repository for credential operations
#[derive(Clone)]
pub struct DynamoDbCredentialRepository {
    client: Arc<DynamoDbClient>,
}

impl DynamoDbCredentialRepository {
    /// Create a new credential repository
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self { client }
    }

    /// Query the owner index, following pagination
    async fn query_owned(&self, owner_id: &str, usable_only: bool) -> Result<Vec<Credential>, StoreError> {
        let mut credentials = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut query = self
                .client
                .client()
                .query()
                .table_name(self.client.credentials_table())
                .index_name(self.client.owner_index())
                .key_condition_expression("owner_id = :owner")
                .expression_attribute_values(":owner", AttributeValue::S(owner_id.to_string()))
                .set_exclusive_start_key(start_key.take());

            if usable_only {
                query = query
                    .filter_expression(USABLE_FILTER)
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":active",
                        AttributeValue::S(CredentialStatus::Active.as_str().to_string()),
                    )
                    .expression_attribute_values(":true", AttributeValue::Bool(true));
            }

            let output = query
                .send()
                .await
                .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

            credentials.extend(parse_items(output.items()));

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(credentials)
    }

    /// Scan for shared credentials, following pagination
    async fn scan_shared(&self, usable_only: bool) -> Result<Vec<Credential>, StoreError> {
        let mut credentials = Vec::new();
        let mut start_key: Option<Item> = None;

        let filter = if usable_only {
            format!("{SHARED_FILTER} AND {USABLE_FILTER}")
        } else {
            SHARED_FILTER.to_string()
        };

        loop {
            let mut scan = self
                .client
                .client()
                .scan()
                .table_name(self.client.credentials_table())
                .filter_expression(filter.clone())
                .expression_attribute_values(":true", AttributeValue::Bool(true))
                .set_exclusive_start_key(start_key.take());

            if usable_only {
                scan = scan
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":active",
                        AttributeValue::S(CredentialStatus::Active.as_str().to_string()),
                    );
            }

            let output = scan
                .send()
                .await
                .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

            credentials.extend(parse_items(output.items()));

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(credentials)
    }
}

#[async_trait]
impl CredentialRepository for DynamoDbCredentialRepository {
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let result = self
            .client
            .client()
            .put_item()
            .table_name(self.client.credentials_table())
            .set_item(Some(credential.to_dynamodb()))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(credential_id = %credential.id, "Stored credential");
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::Conflict(credential.id.clone()))
            }
            Err(e) => Err(StoreError::DynamoDb(e.to_string())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let result = self
            .client
            .client()
            .get_item()
            .table_name(self.client.credentials_table())
            .key("id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => Credential::from_dynamodb(&item)
                .map(Some)
                .ok_or_else(|| StoreError::ParseError(format!("Failed to parse credential {id}"))),
            None => Ok(None),
        }
    }

    async fn find_owned(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        self.query_owned(owner_id, false).await
    }

    async fn find_shared(&self) -> Result<Vec<Credential>, StoreError> {
        self.scan_shared(false).await
    }

    async fn find_owned_active(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        self.query_owned(owner_id, true).await
    }

    async fn find_shared_active(&self) -> Result<Vec<Credential>, StoreError> {
        self.scan_shared(true).await
    }

    async fn update_fields(
        &self,
        id: &str,
        patch: &CredentialPatch,
    ) -> Result<Option<Credential>, StoreError> {
        // A held lease is cleared on its own condition so losing it to
        // another executor never blocks the outcome write.
        if let LeaseRelease::Held(until) = patch.lease {
            self.release_held_lease(id, until).await?;
        }

        let expression = UpdateExpression::from_patch(patch, Utc::now());

        let mut request = self
            .client
            .client()
            .update_item()
            .table_name(self.client.credentials_table())
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression(expression.render())
            .condition_expression("attribute_exists(id)")
            .return_values(ReturnValue::AllNew);

        if expression.uses_status {
            request = request.expression_attribute_names("#status", "status");
        }
        for (name, value) in expression.values {
            request = request.expression_attribute_values(name, value);
        }

        match request.send().await {
            Ok(output) => Ok(output.attributes().and_then(Credential::from_dynamodb)),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(StoreError::DynamoDb(e.to_string())),
        }
    }

    async fn checkout(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = self
            .client
            .client()
            .update_item()
            .table_name(self.client.credentials_table())
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("SET leased_until = :lease_until")
            .condition_expression(
                "attribute_exists(id) AND (attribute_not_exists(leased_until) OR leased_until <= :now)",
            )
            .expression_attribute_values(":lease_until", timestamp_value(lease_until))
            .expression_attribute_values(":now", timestamp_value(now))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(StoreError::DynamoDb(e.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let output = self
            .client
            .client()
            .delete_item()
            .table_name(self.client.credentials_table())
            .key("id", AttributeValue::S(id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        Ok(output.attributes().is_some_and(|attrs| !attrs.is_empty()))
    }
}

impl DynamoDbCredentialRepository {
    /// `REMOVE leased_until` only while it still ends at `until`
    async fn release_held_lease(&self, id: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        let result = self
            .client
            .client()
            .update_item()
            .table_name(self.client.credentials_table())
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("REMOVE leased_until")
            .condition_expression("leased_until = :held")
            .expression_attribute_values(":held", timestamp_value(until))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                tracing::debug!(credential_id = %id, "Lease already taken over, leaving it");
                Ok(())
            }
            Err(e) => Err(StoreError::DynamoDb(e.to_string())),
        }
    }
}

fn parse_items(items: &[Item]) -> impl Iterator<Item = Credential> + '_ {
    items.iter().filter_map(|item| {
        let parsed = Credential::from_dynamodb(item);
        if parsed.is_none() {
            tracing::warn!("Skipping unparseable credential item");
        }
        parsed
    })
}

// ============================================================================
// Update Expression
// ============================================================================

/// `SET` / `ADD` / `REMOVE` clauses built from a patch
#[derive(Debug, Default)]
struct UpdateExpression {
    set: Vec<&'static str>,
    add: Vec<&'static str>,
    remove: Vec<&'static str>,
    values: Vec<(&'static str, AttributeValue)>,
    uses_status: bool,
}

impl UpdateExpression {
    fn from_patch(patch: &CredentialPatch, now: DateTime<Utc>) -> Self {
        let mut expr = Self::default();

        expr.set.push("updated_at = :updated_at");
        expr.values.push((":updated_at", timestamp_value(now)));

        if let Some(status) = patch.status {
            expr.set.push("#status = :status");
            expr.values
                .push((":status", AttributeValue::S(status.as_str().to_string())));
            expr.uses_status = true;
        }
        if let Some(is_active) = patch.is_active {
            expr.set.push("is_active = :is_active");
            expr.values.push((":is_active", AttributeValue::Bool(is_active)));
        }
        if let Some(count) = patch.error_count {
            expr.set.push("error_count = :error_count");
            expr.values
                .push((":error_count", AttributeValue::N(count.to_string())));
        } else if patch.error_increment > 0 {
            expr.add.push("error_count :error_inc");
            expr.values.push((
                ":error_inc",
                AttributeValue::N(patch.error_increment.to_string()),
            ));
        }
        if patch.usage_increment > 0 {
            expr.add.push("usage_count :usage_inc");
            expr.values.push((
                ":usage_inc",
                AttributeValue::N(patch.usage_increment.to_string()),
            ));
        }
        if let Some(ts) = patch.last_used_at {
            expr.set.push("last_used_at = :last_used_at");
            expr.values.push((":last_used_at", timestamp_value(ts)));
        }
        if let Some(error) = &patch.last_error {
            expr.set.push("last_error = :last_error");
            expr.values
                .push((":last_error", AttributeValue::S(error.clone())));
        }
        if let Some(ts) = patch.reset_at {
            expr.set.push("reset_at = :reset_at");
            expr.values.push((":reset_at", timestamp_value(ts)));
        }
        if patch.lease == LeaseRelease::Any {
            expr.remove.push("leased_until");
        }

        expr
    }

    fn render(&self) -> String {
        let mut rendered = format!("SET {}", self.set.join(", "));
        if !self.add.is_empty() {
            rendered.push_str(&format!(" ADD {}", self.add.join(", ")));
        }
        if !self.remove.is_empty() {
            rendered.push_str(&format!(" REMOVE {}", self.remove.join(", ")));
        }
        rendered
    }
}
