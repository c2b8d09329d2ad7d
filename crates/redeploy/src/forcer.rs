//! The deployment forcer: re-point a service's container at a new image tag.
//!
//! For one matched service the forcer
//!
//! 1. takes the pre-resolved tag, or reads it from the version parameter
//!    `/version/ecs/<service>/<repo>`;
//! 2. validates it (empty or malformed tags are rejected before any platform
//!    call);
//! 3. describes the service to find its current task definition revision;
//! 4. rewrites the configured container's image to `<repository>:<tag>` in a
//!    copy of that revision;
//! 5. registers the copy as a new revision;
//! 6. forces a rolling update onto the new revision.
//!
//! Steps 5 and 6 are irreversible platform writes. There is no rollback and no
//! retry: a failure is returned with the operation that failed.
//!
//! If the configured container is missing from the task definition the revision
//! is re-registered unchanged and the forced update still restarts the tasks.
//! That case is logged with `signal = "container_not_found"` and reported as
//! `image_updated = false` so misconfiguration stays visible.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::{
    ContainerName, DeploymentError, DeploymentOutcome, DeploymentRequest, ImageTag,
    OrchestrationPlatform, ParameterStore, ParameterStoreError, PlatformError, PlatformOperation,
    ServiceEntry, TaskDefinitionSnapshot, Timestamp,
};

/// Forces redeployments against an [`OrchestrationPlatform`].
pub struct DeploymentForcer<P, S> {
    platform: Arc<P>,
    parameters: Arc<S>,
}

impl<P, S> DeploymentForcer<P, S>
where
    P: OrchestrationPlatform,
    S: ParameterStore,
{
    /// Creates a forcer over the given platform and parameter store.
    pub fn new(platform: Arc<P>, parameters: Arc<S>) -> Self {
        Self {
            platform,
            parameters,
        }
    }

    /// Runs the full deployment for one request.
    #[instrument(
        name = "force_deployment",
        skip_all,
        fields(
            service = %request.service.name,
            cluster = %request.service.cluster_name,
            ecs_service = %request.service.service_name,
        )
    )]
    pub async fn force(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentOutcome, DeploymentError> {
        let service = &request.service;

        let raw_tag = match &request.resolved_tag {
            Some(tag) => tag.clone(),
            None => self.lookup_tag(service).await?,
        };
        let tag = ImageTag::parse(raw_tag.as_str()).ok_or_else(|| {
            warn!(tag = %raw_tag, "Refusing to deploy invalid image tag");
            DeploymentError::InvalidTag { tag: raw_tag }
        })?;

        let description = self
            .platform
            .describe_service(&service.cluster_name, &service.service_name)
            .await
            .map_err(|e| platform_failure(PlatformOperation::DescribeService, e))?
            .ok_or_else(|| {
                info!("Service not found on the platform");
                DeploymentError::ServiceNotFound {
                    cluster: service.cluster_name.clone(),
                    service: service.service_name.clone(),
                }
            })?;
        info!(task_definition = %description.task_definition, "Current task definition");

        let current = self
            .platform
            .describe_task_definition(&description.task_definition)
            .await
            .map_err(|e| platform_failure(PlatformOperation::DescribeTaskDefinition, e))?;

        let (amended, image_updated) = amend_image(&current, &service.container_name, &tag);

        let new_arn = self
            .platform
            .register_task_definition(&amended)
            .await
            .map_err(|e| platform_failure(PlatformOperation::RegisterTaskDefinition, e))?;
        info!(task_definition = %new_arn, family = amended.family(), "Registered new task definition");

        self.platform
            .update_service(&service.cluster_name, &service.service_name, &new_arn, true)
            .await
            .map_err(|source| {
                error!(
                    operation = %PlatformOperation::UpdateService,
                    task_definition = %new_arn,
                    error = %source,
                    "Forced update failed after registering a new revision"
                );
                DeploymentError::UpdateAfterRegister {
                    task_definition_arn: new_arn.clone(),
                    source,
                }
            })?;
        info!(tag = %tag, image_updated, "Service updated and deployment forced");

        Ok(DeploymentOutcome {
            tag,
            service_name: service.name.clone(),
            cluster: service.cluster_name.clone(),
            ecs_service: service.service_name.clone(),
            task_definition_arn: new_arn,
            image_updated,
            initiated_at: Timestamp::now(),
        })
    }

    async fn lookup_tag(&self, service: &ServiceEntry) -> Result<String, DeploymentError> {
        let path = service.version_parameter_path();
        info!(parameter = %path, "Reading image tag from parameter store");

        self.parameters
            .get_parameter(&path)
            .await
            .map_err(|e| match e {
                ParameterStoreError::NotFound { path } => {
                    warn!(parameter = %path, "No image tag stored for service");
                    DeploymentError::TagLookupFailed { path }
                }
                other => {
                    error!(parameter = %path, error = %other, "Parameter store lookup failed");
                    DeploymentError::ParameterStore(other)
                }
            })
    }
}

/// Returns the snapshot to register and whether the image was rewritten.
fn amend_image<T: TaskDefinitionSnapshot>(
    current: &T,
    container: &ContainerName,
    tag: &ImageTag,
) -> (T, bool) {
    let amended = current.container_image(container).and_then(|image| {
        let new_image = image.with_tag(tag);
        info!(container = %container, from = %image, to = %new_image, "Rewriting container image");
        current.with_container_image(container, &new_image)
    });

    match amended {
        Some(snapshot) => (snapshot, true),
        None => {
            warn!(
                signal = "container_not_found",
                container = %container,
                family = current.family(),
                "Container not found in task definition; forcing deployment without an image change"
            );
            (current.clone(), false)
        }
    }
}

fn platform_failure(operation: PlatformOperation, source: PlatformError) -> DeploymentError {
    error!(operation = %operation, error = %source, "Platform call failed");
    DeploymentError::Platform { operation, source }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::testing::{FakeTaskDefinition, InMemoryParameterStore, InMemoryPlatform};
    use crate::{ClusterName, EcsServiceName, ParameterPath, ServiceKey, SourceRepo};

    fn widget() -> ServiceEntry {
        ServiceEntry {
            name: ServiceKey::new("widget").expect("key"),
            cluster_name: ClusterName::new("c1").expect("cluster"),
            service_name: EcsServiceName::new("s1").expect("service"),
            container_name: ContainerName::new("app").expect("container"),
            source_repo: SourceRepo::new("widget").expect("repo"),
            parameter_path: None,
        }
    }

    fn platform() -> Arc<InMemoryPlatform> {
        let platform = InMemoryPlatform::new();
        platform.add_service(
            "c1",
            "s1",
            FakeTaskDefinition::new("widget")
                .with_container("app", "123.dkr.ecr/region/widget:old")
                .with_container("sidecar", "public.ecr.aws/envoy:v1.30"),
        );
        Arc::new(platform)
    }

    fn forcer(
        platform: &Arc<InMemoryPlatform>,
        parameters: InMemoryParameterStore,
    ) -> DeploymentForcer<InMemoryPlatform, InMemoryParameterStore> {
        DeploymentForcer::new(Arc::clone(platform), Arc::new(parameters))
    }

    fn request(tag: Option<&str>) -> DeploymentRequest {
        DeploymentRequest {
            service: widget(),
            resolved_tag: tag.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_force_with_resolved_tag() {
        let platform = platform();
        let outcome = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("abc123")))
            .await
            .expect("deployed");

        assert_eq!(outcome.tag.as_str(), "abc123");
        assert_eq!(outcome.service_name.as_str(), "widget");
        assert!(outcome.image_updated);

        let registered = platform.registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(
            registered[0].image_of("app"),
            Some("123.dkr.ecr/region/widget:abc123")
        );
        assert_eq!(
            registered[0].image_of("sidecar"),
            Some("public.ecr.aws/envoy:v1.30")
        );

        let updates = platform.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].cluster, "c1");
        assert_eq!(updates[0].service, "s1");
        assert_eq!(updates[0].task_definition, outcome.task_definition_arn.as_str());
        assert!(updates[0].force_new_deployment);
    }

    #[tokio::test]
    async fn test_force_carries_other_fields_forward() {
        let platform = InMemoryPlatform::new();
        let original = FakeTaskDefinition::new("widget")
            .with_container("app", "repo/widget:old")
            .with_cpu("512")
            .with_memory("1024");
        platform.add_service("c1", "s1", original.clone());
        let platform = Arc::new(platform);

        forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("v2")))
            .await
            .expect("deployed");

        let registered = platform.registered().remove(0);
        assert_eq!(registered.cpu, original.cpu);
        assert_eq!(registered.memory, original.memory);
        assert_eq!(registered.network_mode, original.network_mode);
        assert_eq!(registered.family, original.family);
    }

    #[tokio::test]
    async fn test_force_reads_tag_from_parameter_store() {
        let platform = platform();
        let parameters = InMemoryParameterStore::new();
        parameters.put("/version/ecs/widget/widget", "v7");

        let outcome = forcer(&platform, parameters)
            .force(&request(None))
            .await
            .expect("deployed");

        assert_eq!(outcome.tag.as_str(), "v7");
        assert_eq!(
            platform.registered()[0].image_of("app"),
            Some("123.dkr.ecr/region/widget:v7")
        );
    }

    #[tokio::test]
    async fn test_force_missing_parameter_is_tag_lookup_failed() {
        let platform = platform();
        let err = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(None))
            .await
            .expect_err("no tag stored");

        assert_eq!(
            err,
            DeploymentError::TagLookupFailed {
                path: ParameterPath::new("/version/ecs/widget/widget").expect("path"),
            }
        );
        assert_eq!(platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_force_rejects_empty_tag_before_platform_calls() {
        let platform = platform();
        let err = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("")))
            .await
            .expect_err("empty tag");

        assert_eq!(err, DeploymentError::InvalidTag { tag: String::new() });
        assert_eq!(platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_force_unknown_service_is_not_found() {
        let platform = Arc::new(InMemoryPlatform::new());
        let err = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("v1")))
            .await
            .expect_err("unknown service");

        assert!(matches!(err, DeploymentError::ServiceNotFound { .. }));
        assert!(platform.registered().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_force_missing_container_still_forces_update() {
        let platform = InMemoryPlatform::new();
        platform.add_service(
            "c1",
            "s1",
            FakeTaskDefinition::new("widget").with_container("web", "repo/web:old"),
        );
        let platform = Arc::new(platform);

        let outcome = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("v2")))
            .await
            .expect("deployed");

        assert!(!outcome.image_updated);
        assert!(logs_contain("container_not_found"));
        assert!(logs_contain("Container not found in task definition"));
        assert_eq!(platform.registered()[0].image_of("web"), Some("repo/web:old"));
        assert_eq!(platform.updates().len(), 1);
        assert!(platform.updates()[0].force_new_deployment);
    }

    #[tokio::test]
    async fn test_force_register_failure() {
        let platform = platform();
        platform.fail_on(PlatformOperation::RegisterTaskDefinition);

        let err = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("v2")))
            .await
            .expect_err("register fails");

        assert!(matches!(
            err,
            DeploymentError::Platform {
                operation: PlatformOperation::RegisterTaskDefinition,
                ..
            }
        ));
        assert!(platform.updates().is_empty());
    }

    #[tokio::test]
    async fn test_force_update_failure_reports_orphan_revision() {
        let platform = platform();
        platform.fail_on(PlatformOperation::UpdateService);

        let err = forcer(&platform, InMemoryParameterStore::new())
            .force(&request(Some("v2")))
            .await
            .expect_err("update fails");

        let DeploymentError::UpdateAfterRegister {
            task_definition_arn,
            ..
        } = err
        else {
            panic!("expected UpdateAfterRegister, got {err:?}");
        };
        assert_eq!(platform.registered().len(), 1);
        assert!(task_definition_arn.as_str().ends_with("widget:2"));
    }

    #[tokio::test]
    async fn test_force_twice_is_idempotent_on_image() {
        let platform = platform();
        let forcer = forcer(&platform, InMemoryParameterStore::new());

        forcer.force(&request(Some("v2"))).await.expect("first");
        forcer.force(&request(Some("v2"))).await.expect("second");

        let registered = platform.registered();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].image_of("app"), registered[1].image_of("app"));
    }
}
