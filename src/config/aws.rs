//! AWS SDK configuration
//!
//! Builds the DynamoDB client backing the credential store, with support
//! for custom endpoints (DynamoDB Local, LocalStack).

use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;

use crate::config::Settings;

/// AWS configuration builder
pub struct AwsConfigBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> AwsConfigBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Base SDK configuration: region from settings, then the default chain
    pub async fn build_sdk_config(&self) -> SdkConfig {
        let region_provider =
            RegionProviderChain::first_try(Region::new(self.settings.aws_region.clone()))
                .or_default_provider();

        aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await
    }

    /// DynamoDB client, honoring `DYNAMODB_ENDPOINT_URL` when set
    pub async fn build_dynamodb_client(&self) -> DynamoDbSdkClient {
        let sdk_config = self.build_sdk_config().await;

        match &self.settings.dynamodb_endpoint_url {
            Some(endpoint_url) => {
                tracing::info!(endpoint = %endpoint_url, "Using custom DynamoDB endpoint");

                let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint_url)
                    .build();

                DynamoDbSdkClient::from_conf(dynamodb_config)
            }
            None => DynamoDbSdkClient::new(&sdk_config),
        }
    }
}

/// Create a DynamoDB client from settings (convenience function)
pub async fn create_dynamodb_client(settings: &Settings) -> DynamoDbSdkClient {
    AwsConfigBuilder::new(settings).build_dynamodb_client().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_region_from_settings() {
        let settings = Settings {
            aws_region: "eu-west-1".to_string(),
            ..Settings::default()
        };
        let config = AwsConfigBuilder::new(&settings).build_sdk_config().await;
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_local_endpoint_client() {
        let settings = Settings {
            dynamodb_endpoint_url: Some("http://localhost:8000".to_string()),
            ..Settings::default()
        };
        let client = create_dynamodb_client(&settings).await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("us-east-1")
        );
    }
}
