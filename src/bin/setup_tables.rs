//! CLI tool to create the keypool credentials table
//!
//! Usage:
//!   cargo run --bin setup_tables
//!
//! For local development with DynamoDB Local:
//!   DYNAMODB_ENDPOINT_URL=http://localhost:8001 cargo run --bin setup_tables

use anyhow::{Context, Result};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use clap::Parser;
use keypool::config::{create_dynamodb_client, Settings};
use keypool::db::dynamodb::OWNER_INDEX;

/// Create the DynamoDB table backing the credential pool
#[derive(Parser, Debug)]
#[command(name = "setup_tables")]
#[command(about = "Create the DynamoDB table backing the credential pool")]
struct Args {
    /// DynamoDB endpoint URL (overrides DYNAMODB_ENDPOINT_URL)
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Table name (overrides DYNAMODB_CREDENTIALS_TABLE)
    #[arg(long)]
    table: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(url) = args.endpoint_url {
        settings.dynamodb_endpoint_url = Some(url);
    }
    if let Some(table) = args.table {
        settings.dynamodb_credentials_table = table;
    }

    if let Some(url) = &settings.dynamodb_endpoint_url {
        println!("Using DynamoDB endpoint: {}", url);
    }

    let client = create_dynamodb_client(&settings).await;
    let table_name = &settings.dynamodb_credentials_table;

    match create_credentials_table(&client, table_name).await {
        Ok(true) => println!("Created table: {} (index: {})", table_name, OWNER_INDEX),
        Ok(false) => println!("Table already exists: {}", table_name),
        Err(e) => {
            eprintln!("Failed to create table {}: {:#}", table_name, e);
            return Err(e);
        }
    }

    Ok(())
}

/// `id` hash key plus a GSI on `owner_id` for owned-credential queries
async fn create_credentials_table(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<bool> {
    if table_exists(client, table_name).await? {
        return Ok(false);
    }

    client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("id")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("owner_id")
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("id")
                .key_type(KeyType::Hash)
                .build()?,
        )
        .global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(OWNER_INDEX)
                .key_schema(
                    KeySchemaElement::builder()
                        .attribute_name("owner_id")
                        .key_type(KeyType::Hash)
                        .build()?,
                )
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await?;

    Ok(true)
}

async fn table_exists(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<bool> {
    match client.describe_table().table_name(table_name).send().await {
        Ok(_) => Ok(true),
        Err(e)
            if e.as_service_error()
                .is_some_and(|se| se.is_resource_not_found_exception()) =>
        {
            Ok(false)
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to describe table {}", table_name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_client(endpoint: &str) -> aws_sdk_dynamodb::Client {
        let config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(endpoint)
            .build();
        aws_sdk_dynamodb::Client::from_conf(config)
    }

    #[tokio::test]
    async fn test_missing_table_is_reported_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "DynamoDB_20120810.DescribeTable"))
            .respond_with(ResponseTemplate::new(400).set_body_raw(
                r#"{"__type":"com.amazonaws.dynamodb.v20120810#ResourceNotFoundException","message":"Requested resource not found"}"#,
                "application/x-amz-json-1.0",
            ))
            .mount(&server)
            .await;

        let client = local_client(&server.uri());
        assert!(!table_exists(&client, "keypool-credentials").await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_table_is_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "DynamoDB_20120810.DescribeTable"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"Table":{"TableName":"keypool-credentials","TableStatus":"ACTIVE"}}"#,
                "application/x-amz-json-1.0",
            ))
            .mount(&server)
            .await;

        let client = local_client(&server.uri());
        assert!(table_exists(&client, "keypool-credentials").await.unwrap());
    }
}
