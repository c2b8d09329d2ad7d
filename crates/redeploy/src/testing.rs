//! In-memory implementations of the port traits.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for the
//! tests of other workspace crates. They record every call so tests can assert
//! on exactly what would have been sent to the platform.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    ClusterName, ContainerName, EcsServiceName, ImageReference, OrchestrationPlatform,
    ParameterPath, ParameterStore, ParameterStoreError, PlatformError, PlatformOperation,
    SecretProvider, ServiceDescription, TaskDefinitionArn, TaskDefinitionSnapshot,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Task definitions
// ---------------------------------------------------------------------------

/// One container of a [`FakeTaskDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
}

/// A task definition with the fields the carry-forward tests inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeTaskDefinition {
    /// Family name.
    pub family: String,
    /// Container definitions, in order.
    pub containers: Vec<FakeContainer>,
    /// Task-level CPU units.
    pub cpu: Option<String>,
    /// Task-level memory.
    pub memory: Option<String>,
    /// Network mode.
    pub network_mode: Option<String>,
}

impl FakeTaskDefinition {
    /// An `awsvpc` task definition with no containers.
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            containers: Vec::new(),
            cpu: None,
            memory: None,
            network_mode: Some("awsvpc".into()),
        }
    }

    /// Adds a container.
    #[must_use]
    pub fn with_container(mut self, name: impl Into<String>, image: impl Into<String>) -> Self {
        self.containers.push(FakeContainer {
            name: name.into(),
            image: image.into(),
        });
        self
    }

    /// Sets task-level CPU.
    #[must_use]
    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = Some(cpu.into());
        self
    }

    /// Sets task-level memory.
    #[must_use]
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Image of the container named `name`.
    pub fn image_of(&self, name: &str) -> Option<&str> {
        self.containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.image.as_str())
    }
}

impl TaskDefinitionSnapshot for FakeTaskDefinition {
    fn family(&self) -> &str {
        &self.family
    }

    fn container_image(&self, container: &ContainerName) -> Option<ImageReference> {
        self.image_of(container.as_str()).map(ImageReference::new)
    }

    fn with_container_image(&self, container: &ContainerName, image: &ImageReference) -> Option<Self> {
        let index = self
            .containers
            .iter()
            .position(|c| c.name == container.as_str())?;
        let mut amended = self.clone();
        amended.containers[index].image = image.as_str().to_owned();
        Some(amended)
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A recorded `update_service` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUpdate {
    /// Cluster name.
    pub cluster: String,
    /// Service name.
    pub service: String,
    /// ARN the service was pointed at.
    pub task_definition: String,
    /// Whether a forced deployment was requested.
    pub force_new_deployment: bool,
}

#[derive(Debug, Default)]
struct PlatformState {
    services: HashMap<(String, String), TaskDefinitionArn>,
    definitions: HashMap<String, FakeTaskDefinition>,
    revisions: HashMap<String, u32>,
    registered: Vec<FakeTaskDefinition>,
    updates: Vec<ServiceUpdate>,
    calls: usize,
    fail_on: Option<PlatformOperation>,
}

impl PlatformState {
    fn store(&mut self, definition: FakeTaskDefinition) -> TaskDefinitionArn {
        let revision = self.revisions.entry(definition.family.clone()).or_insert(0);
        *revision += 1;
        let arn = format!(
            "arn:aws:ecs:us-east-1:000000000000:task-definition/{}:{}",
            definition.family, revision
        );
        self.definitions.insert(arn.clone(), definition);
        TaskDefinitionArn::new(arn).unwrap_or_else(|| unreachable!("formatted ARN is non-empty"))
    }

    fn enter(&mut self, operation: PlatformOperation) -> Result<(), PlatformError> {
        self.calls += 1;
        if self.fail_on == Some(operation) {
            return Err(PlatformError::Api(format!("injected {operation} failure")));
        }
        Ok(())
    }
}

/// An orchestration platform held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    /// An empty platform with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service running `definition` as revision 1 of its family.
    pub fn add_service(
        &self,
        cluster: &str,
        service: &str,
        definition: FakeTaskDefinition,
    ) -> TaskDefinitionArn {
        let mut state = lock(&self.state);
        let arn = state.store(definition);
        state
            .services
            .insert((cluster.to_owned(), service.to_owned()), arn.clone());
        arn
    }

    /// Makes every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: PlatformOperation) {
        lock(&self.state).fail_on = Some(operation);
    }

    /// Task definitions registered through the port, in order.
    pub fn registered(&self) -> Vec<FakeTaskDefinition> {
        lock(&self.state).registered.clone()
    }

    /// `update_service` calls, in order.
    pub fn updates(&self) -> Vec<ServiceUpdate> {
        lock(&self.state).updates.clone()
    }

    /// Total number of port calls made.
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls
    }
}

#[async_trait]
impl OrchestrationPlatform for InMemoryPlatform {
    type TaskDefinition = FakeTaskDefinition;

    async fn describe_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
    ) -> Result<Option<ServiceDescription>, PlatformError> {
        let mut state = lock(&self.state);
        state.enter(PlatformOperation::DescribeService)?;
        Ok(state
            .services
            .get(&(cluster.to_string(), service.to_string()))
            .map(|arn| ServiceDescription {
                task_definition: arn.clone(),
            }))
    }

    async fn describe_task_definition(
        &self,
        arn: &TaskDefinitionArn,
    ) -> Result<FakeTaskDefinition, PlatformError> {
        let mut state = lock(&self.state);
        state.enter(PlatformOperation::DescribeTaskDefinition)?;
        state
            .definitions
            .get(arn.as_str())
            .cloned()
            .ok_or_else(|| PlatformError::Api(format!("task definition {arn} does not exist")))
    }

    async fn register_task_definition(
        &self,
        definition: &FakeTaskDefinition,
    ) -> Result<TaskDefinitionArn, PlatformError> {
        let mut state = lock(&self.state);
        state.enter(PlatformOperation::RegisterTaskDefinition)?;
        state.registered.push(definition.clone());
        Ok(state.store(definition.clone()))
    }

    async fn update_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
        task_definition: &TaskDefinitionArn,
        force_new_deployment: bool,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        state.enter(PlatformOperation::UpdateService)?;
        let key = (cluster.to_string(), service.to_string());
        if !state.services.contains_key(&key) {
            return Err(PlatformError::Api(format!("service {service} not found")));
        }
        state.services.insert(key, task_definition.clone());
        state.updates.push(ServiceUpdate {
            cluster: cluster.to_string(),
            service: service.to_string(),
            task_definition: task_definition.to_string(),
            force_new_deployment,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parameter and secret stores
// ---------------------------------------------------------------------------

/// A parameter store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryParameterStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `path` to `value`.
    pub fn put(&self, path: impl Into<String>, value: impl Into<String>) {
        lock(&self.values).insert(path.into(), value.into());
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn get_parameter(&self, path: &ParameterPath) -> Result<String, ParameterStoreError> {
        lock(&self.values)
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| ParameterStoreError::NotFound { path: path.clone() })
    }
}

/// A secret provider returning a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider(pub Option<String>);

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_webhook_secret(&self) -> Option<String> {
        self.0.clone()
    }
}
