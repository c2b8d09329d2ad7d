//! Port traits for the external collaborators the engine consumes.
//!
//! Infrastructure crates implement these; the domain never sees a transport,
//! an SDK, or credentials. Every call is independently fallible, and none is
//! retried here.

use async_trait::async_trait;

use crate::{
    ClusterName, ContainerName, EcsServiceName, ImageReference, ParameterPath,
    ParameterStoreError, PlatformError, TaskDefinitionArn,
};

// ---------------------------------------------------------------------------
// Parameter store
// ---------------------------------------------------------------------------

/// Versioned key-value store holding the image tag to deploy per service.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Reads the current value at `path`.
    ///
    /// Returns [`ParameterStoreError::NotFound`] when nothing is stored there.
    async fn get_parameter(&self, path: &ParameterPath) -> Result<String, ParameterStoreError>;
}

// ---------------------------------------------------------------------------
// Secret store
// ---------------------------------------------------------------------------

/// Source of the shared webhook secret.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Returns the secret, or `None` when it is not configured or cannot be
    /// read. Implementations log their own failures; callers never see them.
    async fn get_webhook_secret(&self) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Orchestration platform
// ---------------------------------------------------------------------------

/// The parts of a service description the engine uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    /// The task definition revision the service currently runs.
    pub task_definition: TaskDefinitionArn,
}

/// A task definition revision as fetched from the platform.
///
/// Snapshots are immutable values: amending one yields a new snapshot, and the
/// fetched original is never sent back. Everything other than container images
/// (roles, network mode, volumes, placement constraints, compatibilities, CPU,
/// memory, runtime platform, and all other container settings) must survive
/// [`TaskDefinitionSnapshot::with_container_image`] unchanged.
pub trait TaskDefinitionSnapshot: Clone + Send + Sync {
    /// The task definition family.
    fn family(&self) -> &str;

    /// Current image of the container named `container`, if it exists.
    fn container_image(&self, container: &ContainerName) -> Option<ImageReference>;

    /// A copy of this snapshot with `container`'s image replaced, or `None`
    /// if no container has that name.
    #[must_use]
    fn with_container_image(&self, container: &ContainerName, image: &ImageReference) -> Option<Self>;
}

/// The managed container-orchestration service.
#[async_trait]
pub trait OrchestrationPlatform: Send + Sync {
    /// The platform's task definition representation.
    type TaskDefinition: TaskDefinitionSnapshot;

    /// Describes one service. `Ok(None)` means the platform reports no such
    /// service in the cluster.
    async fn describe_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
    ) -> Result<Option<ServiceDescription>, PlatformError>;

    /// Fetches the full task definition revision `arn`.
    async fn describe_task_definition(
        &self,
        arn: &TaskDefinitionArn,
    ) -> Result<Self::TaskDefinition, PlatformError>;

    /// Registers `definition` as a new revision of its family and returns the
    /// new revision's ARN.
    async fn register_task_definition(
        &self,
        definition: &Self::TaskDefinition,
    ) -> Result<TaskDefinitionArn, PlatformError>;

    /// Points `service` at `task_definition` and starts a rolling update.
    ///
    /// With `force_new_deployment`, running tasks are replaced even if the
    /// revision is unchanged.
    async fn update_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
        task_definition: &TaskDefinitionArn,
        force_new_deployment: bool,
    ) -> Result<(), PlatformError>;
}
