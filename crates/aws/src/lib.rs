//! Redeployer AWS infrastructure adapter.
//!
//! Implements the port traits defined in the [`redeploy`] crate against AWS:
//!
//! - [`EcsPlatform`]: [`redeploy::OrchestrationPlatform`] over Amazon ECS.
//! - [`SsmParameterStore`]: [`redeploy::ParameterStore`] over SSM Parameter Store.
//! - [`SecretsManagerSecretProvider`]: [`redeploy::SecretProvider`] over
//!   Secrets Manager.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. SDK error
//! shapes, credential resolution and request building are handled here; the
//! [`redeploy`] crate never sees them. No call is retried beyond what the SDK's
//! default retry configuration does.

mod clients;
mod ecs;
mod secrets;
mod ssm;

pub use clients::AwsClients;
pub use ecs::{EcsPlatform, EcsTaskDefinition};
pub use secrets::{SecretsManagerSecretProvider, WEBHOOK_SECRET_KEY};
pub use ssm::SsmParameterStore;
