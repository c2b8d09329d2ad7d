//! [`OrchestrationPlatform`] over Amazon ECS.

use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::types::TaskDefinition;
use tracing::{debug, info};

use redeploy::{
    ClusterName, ContainerName, EcsServiceName, ImageReference, OrchestrationPlatform,
    PlatformError, ServiceDescription, TaskDefinitionArn, TaskDefinitionSnapshot,
};

/// Status ECS reports for a deleted service that is still describable.
const INACTIVE_STATUS: &str = "INACTIVE";

// ---------------------------------------------------------------------------
// Task definition snapshot
// ---------------------------------------------------------------------------

/// A task definition revision exactly as ECS returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct EcsTaskDefinition(TaskDefinition);

impl EcsTaskDefinition {
    /// Wraps an SDK task definition.
    pub fn new(definition: TaskDefinition) -> Self {
        Self(definition)
    }

    /// The wrapped SDK value.
    pub fn as_sdk(&self) -> &TaskDefinition {
        &self.0
    }
}

impl TaskDefinitionSnapshot for EcsTaskDefinition {
    fn family(&self) -> &str {
        self.0.family().unwrap_or_default()
    }

    fn container_image(&self, container: &ContainerName) -> Option<ImageReference> {
        self.0
            .container_definitions()
            .iter()
            .find(|c| c.name() == Some(container.as_str()))
            .and_then(|c| c.image())
            .map(ImageReference::new)
    }

    fn with_container_image(&self, container: &ContainerName, image: &ImageReference) -> Option<Self> {
        let mut amended = self.0.clone();
        let definition = amended
            .container_definitions
            .as_mut()?
            .iter_mut()
            .find(|c| c.name.as_deref() == Some(container.as_str()))?;
        definition.image = Some(image.as_str().to_owned());
        Some(Self(amended))
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// ECS-backed orchestration platform.
#[derive(Debug, Clone)]
pub struct EcsPlatform {
    client: aws_sdk_ecs::Client,
}

impl EcsPlatform {
    /// Creates the adapter over an existing client.
    pub fn new(client: aws_sdk_ecs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrchestrationPlatform for EcsPlatform {
    type TaskDefinition = EcsTaskDefinition;

    async fn describe_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
    ) -> Result<Option<ServiceDescription>, PlatformError> {
        let result = self
            .client
            .describe_services()
            .cluster(cluster.as_str())
            .services(service.as_str())
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_cluster_not_found_exception()) =>
            {
                info!(cluster = %cluster, "Cluster not found");
                return Ok(None);
            }
            Err(e) => return Err(api_error(e)),
        };

        for failure in output.failures() {
            debug!(arn = ?failure.arn(), reason = ?failure.reason(), "describe_services failure entry");
        }

        let description = output
            .services()
            .iter()
            .find(|s| s.status() != Some(INACTIVE_STATUS))
            .and_then(|s| s.task_definition())
            .and_then(TaskDefinitionArn::new)
            .map(|task_definition| ServiceDescription { task_definition });
        Ok(description)
    }

    async fn describe_task_definition(
        &self,
        arn: &TaskDefinitionArn,
    ) -> Result<EcsTaskDefinition, PlatformError> {
        let output = self
            .client
            .describe_task_definition()
            .task_definition(arn.as_str())
            .send()
            .await
            .map_err(api_error)?;

        output
            .task_definition
            .map(EcsTaskDefinition)
            .ok_or_else(|| {
                PlatformError::MalformedResponse(format!(
                    "describe_task_definition returned no task definition for {arn}"
                ))
            })
    }

    async fn register_task_definition(
        &self,
        definition: &EcsTaskDefinition,
    ) -> Result<TaskDefinitionArn, PlatformError> {
        let output = carry_forward(self.client.register_task_definition(), &definition.0)
            .send()
            .await
            .map_err(api_error)?;

        output
            .task_definition()
            .and_then(|td| td.task_definition_arn())
            .and_then(TaskDefinitionArn::new)
            .ok_or_else(|| {
                PlatformError::MalformedResponse(
                    "register_task_definition returned no task definition ARN".to_owned(),
                )
            })
    }

    async fn update_service(
        &self,
        cluster: &ClusterName,
        service: &EcsServiceName,
        task_definition: &TaskDefinitionArn,
        force_new_deployment: bool,
    ) -> Result<(), PlatformError> {
        self.client
            .update_service()
            .cluster(cluster.as_str())
            .service(service.as_str())
            .task_definition(task_definition.as_str())
            .force_new_deployment(force_new_deployment)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

/// Copies every registrable field of `definition` onto the request.
///
/// Read-only fields ECS adds on describe (ARN, revision, status,
/// registration metadata, `requiresAttributes`, `compatibilities`) are not
/// accepted by register and are left out.
fn carry_forward(
    builder: RegisterTaskDefinitionFluentBuilder,
    definition: &TaskDefinition,
) -> RegisterTaskDefinitionFluentBuilder {
    builder
        .set_family(definition.family.clone())
        .set_task_role_arn(definition.task_role_arn.clone())
        .set_execution_role_arn(definition.execution_role_arn.clone())
        .set_network_mode(definition.network_mode.clone())
        .set_container_definitions(definition.container_definitions.clone())
        .set_volumes(definition.volumes.clone())
        .set_placement_constraints(definition.placement_constraints.clone())
        .set_requires_compatibilities(definition.requires_compatibilities.clone())
        .set_cpu(definition.cpu.clone())
        .set_memory(definition.memory.clone())
        .set_runtime_platform(definition.runtime_platform.clone())
        .set_pid_mode(definition.pid_mode.clone())
        .set_ipc_mode(definition.ipc_mode.clone())
        .set_proxy_configuration(definition.proxy_configuration.clone())
        .set_inference_accelerators(definition.inference_accelerators.clone())
        .set_ephemeral_storage(definition.ephemeral_storage.clone())
}

fn api_error<E>(error: E) -> PlatformError
where
    E: std::error::Error + 'static,
{
    PlatformError::Api(DisplayErrorContext(error).to_string())
}

#[cfg(test)]
mod tests {
    use aws_sdk_ecs::config::{BehaviorVersion, Region};
    use aws_sdk_ecs::types::{
        Compatibility, ContainerDefinition, NetworkMode, RuntimePlatform,
        TaskDefinitionPlacementConstraint, TaskDefinitionPlacementConstraintType, Volume,
    };

    use super::*;

    fn definition() -> TaskDefinition {
        TaskDefinition::builder()
            .task_definition_arn("arn:aws:ecs:eu-west-1:123456789012:task-definition/widget:7")
            .family("widget")
            .revision(7)
            .task_role_arn("arn:aws:iam::123456789012:role/widget-task")
            .execution_role_arn("arn:aws:iam::123456789012:role/widget-exec")
            .network_mode(NetworkMode::Awsvpc)
            .container_definitions(
                ContainerDefinition::builder()
                    .name("app")
                    .image("123456789012.dkr.ecr.eu-west-1.amazonaws.com/widget:old")
                    .essential(true)
                    .build(),
            )
            .container_definitions(
                ContainerDefinition::builder()
                    .name("sidecar")
                    .image("public.ecr.aws/aws-observability/aws-otel-collector:v0.40.0")
                    .build(),
            )
            .volumes(Volume::builder().name("scratch").build())
            .placement_constraints(
                TaskDefinitionPlacementConstraint::builder()
                    .r#type(TaskDefinitionPlacementConstraintType::MemberOf)
                    .expression("attribute:ecs.availability-zone in [eu-west-1a]")
                    .build(),
            )
            .requires_compatibilities(Compatibility::Fargate)
            .cpu("256")
            .memory("512")
            .runtime_platform(RuntimePlatform::builder().build())
            .build()
    }

    fn app() -> ContainerName {
        ContainerName::new("app").expect("container")
    }

    #[test]
    fn test_container_image_finds_named_container() {
        let snapshot = EcsTaskDefinition::new(definition());

        assert_eq!(snapshot.family(), "widget");
        assert_eq!(
            snapshot.container_image(&app()).map(|i| i.as_str().to_owned()),
            Some("123456789012.dkr.ecr.eu-west-1.amazonaws.com/widget:old".to_owned())
        );
        assert!(snapshot
            .container_image(&ContainerName::new("missing").expect("container"))
            .is_none());
    }

    #[test]
    fn test_with_container_image_changes_only_that_container() {
        let original = EcsTaskDefinition::new(definition());
        let image = ImageReference::new("123456789012.dkr.ecr.eu-west-1.amazonaws.com/widget:abc123");

        let amended = original.with_container_image(&app(), &image).expect("amended");

        let containers = amended.as_sdk().container_definitions();
        assert_eq!(containers[0].image(), Some(image.as_str()));
        assert_eq!(containers[0].essential(), Some(true));
        assert_eq!(containers[1], original.as_sdk().container_definitions()[1]);
        assert_eq!(amended.as_sdk().cpu(), Some("256"));
        // The fetched snapshot is untouched.
        assert_eq!(
            original.as_sdk().container_definitions()[0].image(),
            Some("123456789012.dkr.ecr.eu-west-1.amazonaws.com/widget:old")
        );
    }

    #[test]
    fn test_with_container_image_missing_container() {
        let original = EcsTaskDefinition::new(definition());
        let image = ImageReference::new("widget:new");

        assert!(original
            .with_container_image(&ContainerName::new("web").expect("container"), &image)
            .is_none());
    }

    #[test]
    fn test_carry_forward_copies_registrable_fields() {
        let config = aws_sdk_ecs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .build();
        let client = aws_sdk_ecs::Client::from_conf(config);
        let source = definition();

        let builder = carry_forward(client.register_task_definition(), &source);
        let input = builder.as_input();

        assert_eq!(input.get_family().as_deref(), Some("widget"));
        assert_eq!(input.get_task_role_arn(), &source.task_role_arn);
        assert_eq!(input.get_execution_role_arn(), &source.execution_role_arn);
        assert_eq!(input.get_network_mode(), &Some(NetworkMode::Awsvpc));
        assert_eq!(input.get_container_definitions(), &source.container_definitions);
        assert_eq!(input.get_volumes(), &source.volumes);
        assert_eq!(input.get_placement_constraints(), &source.placement_constraints);
        assert_eq!(
            input.get_requires_compatibilities(),
            &Some(vec![Compatibility::Fargate])
        );
        assert_eq!(input.get_cpu().as_deref(), Some("256"));
        assert_eq!(input.get_memory().as_deref(), Some("512"));
        assert_eq!(input.get_runtime_platform(), &source.runtime_platform);
    }
}
