//! Decision engine for the container redeployer.
//!
//! Turns a package-published webhook or a parameter-change notification into a
//! forced rolling deployment of the matching container service. Infrastructure
//! crates implement the port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It decides *what* to deploy; the `aws` crate supplies *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ServiceKey`, `ClusterName`, `ImageTag`, etc.) |
//! | [`types`] | Shared value types (`ImageReference`, `DeploymentOutcome`, `Timestamp`) |
//! | [`errors`] | Error enums and their status classes |
//! | [`registry`] | The static service registry |
//! | [`event`] | Envelope decoding and event normalisation |
//! | [`matcher`] | Matching events to registry entries |
//! | [`resolver`] | Image tag resolution for package events |
//! | [`ports`] | Parameter store, secret store, and orchestration platform traits |
//! | [`forcer`] | Task definition mutation and the forced update |
//! | [`relay`] | End-to-end event handling |

pub mod errors;
pub mod event;
pub mod forcer;
pub mod identifiers;
pub mod matcher;
pub mod ports;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{
    DeploymentError, NormalizationError, ParameterStoreError, PlatformError, PlatformOperation,
    RegistryError, RelayError, StatusClass,
};
pub use event::{
    BranchRef, IgnoreReason, InboundEvent, Normalized, PackagePublished, ParameterChanged,
    RawEnvelope,
};
pub use forcer::DeploymentForcer;
pub use identifiers::{
    BranchName, ClusterName, ContainerName, EcsServiceName, ImageTag, InvocationId, ParameterPath,
    ServiceKey, SourceRepo, TaskDefinitionArn, VERSION_PARAMETER_PREFIX,
};
pub use matcher::ServiceMatcher;
pub use ports::{
    OrchestrationPlatform, ParameterStore, SecretProvider, ServiceDescription,
    TaskDefinitionSnapshot,
};
pub use registry::{RegistryLookup, ServiceEntry, ServiceRegistry};
pub use relay::{EventHandler, MatchKey, Relay, RelayOutcome};
pub use types::{DeploymentOutcome, DeploymentRequest, ImageReference, Timestamp};
