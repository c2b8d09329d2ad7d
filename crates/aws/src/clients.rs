use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::{EcsPlatform, SecretsManagerSecretProvider, SsmParameterStore};

/// The three adapters, built from one shared SDK configuration.
#[derive(Debug, Clone)]
pub struct AwsClients {
    /// Orchestration platform adapter.
    pub platform: EcsPlatform,
    /// Parameter store adapter.
    pub parameters: SsmParameterStore,
    /// Secret provider, reading the webhook secret from `secret_arn`.
    pub secrets: SecretsManagerSecretProvider,
}

impl AwsClients {
    /// Loads credentials and region from the default provider chain, with an
    /// optional region override.
    pub async fn load(region: Option<String>, secret_arn: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        tracing::info!(region = ?config.region(), "Loaded AWS configuration");
        Self::from_config(&config, secret_arn)
    }

    /// Builds the adapters from an existing SDK configuration.
    pub fn from_config(config: &SdkConfig, secret_arn: Option<String>) -> Self {
        Self {
            platform: EcsPlatform::new(aws_sdk_ecs::Client::new(config)),
            parameters: SsmParameterStore::new(aws_sdk_ssm::Client::new(config)),
            secrets: SecretsManagerSecretProvider::new(
                aws_sdk_secretsmanager::Client::new(config),
                secret_arn,
            ),
        }
    }
}
