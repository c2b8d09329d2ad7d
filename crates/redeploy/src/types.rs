//! Shared value types for the redeploy domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! behaviour: an [`ImageReference`] knows how to re-point itself at a new tag,
//! and a [`DeploymentOutcome`] records what a forced deployment actually did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ClusterName, EcsServiceName, ImageTag, ServiceEntry, ServiceKey, TaskDefinitionArn,
};

// ---------------------------------------------------------------------------
// Image references
// ---------------------------------------------------------------------------

/// A container image reference such as `123.dkr.ecr.eu-west-1.amazonaws.com/app:old`.
///
/// Only the repository part is interpreted. Registry hosts with a port
/// (`registry:5000/app`) keep their port because the tag separator is searched
/// for after the final `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference(String);

impl ImageReference {
    /// Wraps a raw image reference string.
    pub fn new(image: impl Into<String>) -> Self {
        Self(image.into())
    }

    /// Returns the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the repository part: everything before the tag separator, with
    /// any `@digest` suffix removed.
    pub fn repository(&self) -> &str {
        let without_digest = self.0.split_once('@').map_or(self.0.as_str(), |(repo, _)| repo);
        let name_start = without_digest.rfind('/').map_or(0, |i| i + 1);
        match without_digest[name_start..].rfind(':') {
            Some(colon) => &without_digest[..name_start + colon],
            None => without_digest,
        }
    }

    /// Returns a new reference pointing at the same repository with `tag`.
    ///
    /// Idempotent: applying the same tag twice yields the same reference.
    #[must_use]
    pub fn with_tag(&self, tag: &ImageTag) -> Self {
        Self(format!("{}:{}", self.repository(), tag))
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Deployment request / outcome
// ---------------------------------------------------------------------------

/// A request to force a new deployment of one registry service.
///
/// `resolved_tag` is `None` on the parameter-change path, where the forcer
/// reads the tag from the parameter store itself, and `Some` on the webhook
/// path, where the tag resolver already computed it. A `Some("")` is a valid
/// request that the forcer rejects explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// The matched registry entry.
    pub service: ServiceEntry,
    /// Pre-computed tag, if any.
    pub resolved_tag: Option<String>,
}

/// What a successful forced deployment did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    /// Tag the service now points at.
    pub tag: ImageTag,
    /// Registry key of the deployed service.
    pub service_name: ServiceKey,
    /// Cluster the update was issued against.
    pub cluster: ClusterName,
    /// Platform service that was updated.
    pub ecs_service: EcsServiceName,
    /// The newly registered task definition revision.
    pub task_definition_arn: TaskDefinitionArn,
    /// `false` when the configured container was absent from the task
    /// definition and the image could not be rewritten.
    pub image_updated: bool,
    /// When the forced update was accepted by the platform.
    pub initiated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
