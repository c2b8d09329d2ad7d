//! [`ParameterStore`] over SSM Parameter Store.

use async_trait::async_trait;
use aws_sdk_ssm::error::DisplayErrorContext;

use redeploy::{ParameterPath, ParameterStore, ParameterStoreError};

/// SSM-backed parameter store.
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    /// Creates the adapter over an existing client.
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, path: &ParameterPath) -> Result<String, ParameterStoreError> {
        let output = self
            .client
            .get_parameter()
            .name(path.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) {
                    ParameterStoreError::NotFound { path: path.clone() }
                } else {
                    ParameterStoreError::Backend(DisplayErrorContext(e).to_string())
                }
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_owned)
            .ok_or_else(|| {
                ParameterStoreError::Backend(format!("get_parameter returned no value for {path}"))
            })
    }
}
