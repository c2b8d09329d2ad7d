//! Error types for the redeploy domain and the status classification they map to.
//!
//! Each component owns one error enum. [`StatusClass`] is the cross-cutting
//! concern: every error (and every non-error outcome) must be able to say which
//! HTTP-like class it belongs to, so the front door can serialise it without
//! knowing the component that produced it.
//!
//! Nothing in this crate retries. A failure is classified and surfaced once.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ClusterName, EcsServiceName, ParameterPath, TaskDefinitionArn};

// ---------------------------------------------------------------------------
// Status classification
// ---------------------------------------------------------------------------

/// HTTP-like outcome class returned to the front door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Deployment initiated, event ignored, or no service configured.
    Success,
    /// The event was malformed or carried an unusable tag.
    ClientError,
    /// A service or tag the event refers to does not exist.
    NotFound,
    /// A platform or parameter-store call failed.
    ServerError,
}

impl StatusClass {
    /// Returns the HTTP status code for this class.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::ClientError => 400,
            Self::NotFound => 404,
            Self::ServerError => 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Errors raised while loading the service registry.
///
/// The registry is loaded once at start-up; any of these aborts the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two entries share the same registry key.
    #[error("Duplicate service name in registry: {name}")]
    DuplicateService {
        /// The repeated key.
        name: String,
    },

    /// An entry is missing a required field or has it empty.
    #[error("Service '{name}' has a missing or empty '{field}'")]
    InvalidEntry {
        /// Registry key of the offending entry.
        name: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The registry document could not be parsed.
    #[error("Registry could not be parsed: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Event normalisation
// ---------------------------------------------------------------------------

/// Errors raised while decoding an inbound envelope.
///
/// All variants are client errors: the sender delivered something we cannot
/// interpret, and re-delivering it unchanged will not help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// The body was flagged as base64 but did not decode.
    #[error("Body is not valid base64: {0}")]
    InvalidBase64(String),

    /// The body (or its form `payload` field) is not a JSON object.
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),

    /// A package event carried no usable repository identifier.
    #[error("Repository information missing")]
    MissingRepository,

    /// A parameter-change event carried neither `detail.name` nor `parameterName`.
    #[error("Parameter name not found in event")]
    MissingParameterName,
}

impl NormalizationError {
    /// Status class of this error.
    pub fn status_class(&self) -> StatusClass {
        StatusClass::ClientError
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Errors returned by a [`crate::ParameterStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterStoreError {
    /// No parameter exists at the path.
    #[error("Parameter not found: {path}")]
    NotFound {
        /// The requested path.
        path: ParameterPath,
    },

    /// The store could not be reached or returned an unexpected response.
    #[error("Parameter store error: {0}")]
    Backend(String),
}

/// Errors returned by an [`crate::OrchestrationPlatform`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform API rejected or failed the call.
    #[error("Platform API error: {0}")]
    Api(String),

    /// The platform answered, but without a field the engine needs.
    #[error("Malformed platform response: {0}")]
    MalformedResponse(String),
}

/// The platform call that failed, for error context and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOperation {
    /// Fetching the service description.
    DescribeService,
    /// Fetching the current task definition.
    DescribeTaskDefinition,
    /// Registering the amended revision.
    RegisterTaskDefinition,
    /// Issuing the forced rolling update.
    UpdateService,
}

impl std::fmt::Display for PlatformOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DescribeService => "describe_service",
            Self::DescribeTaskDefinition => "describe_task_definition",
            Self::RegisterTaskDefinition => "register_task_definition",
            Self::UpdateService => "update_service",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Errors raised by the [`crate::DeploymentForcer`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeploymentError {
    /// No tag was supplied and none exists at the version parameter path.
    #[error("Image tag not found at parameter {path}")]
    TagLookupFailed {
        /// The version parameter path that was read.
        path: ParameterPath,
    },

    /// The parameter store itself failed while looking up the tag.
    #[error("Image tag lookup failed: {0}")]
    ParameterStore(ParameterStoreError),

    /// The resolved tag is empty or not a valid registry tag.
    #[error("Refusing to deploy invalid image tag '{tag}'")]
    InvalidTag {
        /// The rejected tag, verbatim.
        tag: String,
    },

    /// The platform reports no such service in the cluster.
    #[error("Service {service} not found in cluster {cluster}")]
    ServiceNotFound {
        /// Cluster that was searched.
        cluster: ClusterName,
        /// Platform service name that was not found.
        service: EcsServiceName,
    },

    /// A platform call failed.
    #[error("{operation} failed: {source}")]
    Platform {
        /// Which call failed.
        operation: PlatformOperation,
        /// The underlying platform error.
        source: PlatformError,
    },

    /// The new revision was registered but the forced update was not accepted.
    ///
    /// The registered revision is left orphaned; nothing points at it.
    #[error("Registered {task_definition_arn} but update_service failed: {source}")]
    UpdateAfterRegister {
        /// The revision that was registered.
        task_definition_arn: TaskDefinitionArn,
        /// The underlying platform error.
        source: PlatformError,
    },
}

impl DeploymentError {
    /// Status class of this error.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::InvalidTag { .. } => StatusClass::ClientError,
            Self::TagLookupFailed { .. } | Self::ServiceNotFound { .. } => StatusClass::NotFound,
            Self::ParameterStore(_) | Self::Platform { .. } | Self::UpdateAfterRegister { .. } => {
                StatusClass::ServerError
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Any failure while handling one event end to end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The envelope could not be normalised.
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// The deployment could not be forced.
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

impl RelayError {
    /// Status class of this error.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Normalization(e) => e.status_class(),
            Self::Deployment(e) => e.status_class(),
        }
    }
}
