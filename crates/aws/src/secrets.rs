//! [`SecretProvider`] over Secrets Manager.
//!
//! The secret is a JSON object; the webhook secret lives under
//! [`WEBHOOK_SECRET_KEY`]. Every failure is logged here and reported to the
//! caller as `None`, which the signature verifier treats as "no secret".

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde_json::Value;
use tracing::{debug, error, warn};

use redeploy::SecretProvider;

/// Key of the webhook secret inside the stored JSON object.
pub const WEBHOOK_SECRET_KEY: &str = "webhook_secret";

/// Secrets Manager-backed secret provider.
#[derive(Debug, Clone)]
pub struct SecretsManagerSecretProvider {
    client: aws_sdk_secretsmanager::Client,
    secret_arn: Option<String>,
}

impl SecretsManagerSecretProvider {
    /// Creates the adapter. An absent or empty `secret_arn` means no secret is
    /// configured.
    pub fn new(client: aws_sdk_secretsmanager::Client, secret_arn: Option<String>) -> Self {
        Self {
            client,
            secret_arn: secret_arn.filter(|arn| !arn.is_empty()),
        }
    }
}

#[async_trait]
impl SecretProvider for SecretsManagerSecretProvider {
    async fn get_webhook_secret(&self) -> Option<String> {
        let Some(arn) = self.secret_arn.as_deref() else {
            debug!("No webhook secret ARN configured");
            return None;
        };

        let output = match self.client.get_secret_value().secret_id(arn).send().await {
            Ok(output) => output,
            Err(e) => {
                error!(secret_arn = arn, error = %DisplayErrorContext(e), "Failed to read webhook secret");
                return None;
            }
        };

        let Some(secret_string) = output.secret_string() else {
            warn!(secret_arn = arn, "Webhook secret has no string value");
            return None;
        };

        extract_webhook_secret(secret_string).or_else(|| {
            warn!(
                secret_arn = arn,
                key = WEBHOOK_SECRET_KEY,
                "Webhook secret is not a JSON object with a non-empty string under the expected key"
            );
            None
        })
    }
}

fn extract_webhook_secret(secret_string: &str) -> Option<String> {
    let value: Value = serde_json::from_str(secret_string).ok()?;
    value
        .get(WEBHOOK_SECRET_KEY)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
