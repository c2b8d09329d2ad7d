//! The relay: one inbound event in, one classified outcome out.
//!
//! ```text
//! RawEnvelope ──normalize_webhook──▶ PackagePublished ──resolve──▶ tag ─┐
//!                                          │                            │
//!                                   find_by_repo ───▶ ServiceEntry ─────┴─▶ DeploymentForcer
//!                                                                        ▲
//! parameter event ──normalize_parameter_change──▶ find_by_parameter ─────┘ (tag read from store)
//! ```
//!
//! Every outcome, including failures, is folded into a [`RelayOutcome`] the
//! front door can serialise. Each handled event runs inside a tracing span
//! carrying a fresh [`InvocationId`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, info_span, Instrument};

use crate::event::{normalize_parameter_change, normalize_webhook};
use crate::{
    resolver, DeploymentForcer, DeploymentOutcome, DeploymentRequest, IgnoreReason, InboundEvent,
    InvocationId, Normalized, OrchestrationPlatform, ParameterPath, ParameterStore, RawEnvelope,
    RegistryLookup, RelayError, ServiceMatcher, StatusClass,
};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the lookup that found no service was keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKey {
    /// A repository name from a package event.
    Repository(String),
    /// A parameter path from a parameter-change event.
    Parameter(ParameterPath),
}

/// The result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A forced deployment was initiated.
    Deployed(DeploymentOutcome),
    /// The delivery was valid but irrelevant.
    Ignored(IgnoreReason),
    /// No registry entry targets this event; nothing was done.
    NoMatchingService(MatchKey),
    /// The event could not be handled.
    Rejected(RelayError),
}

impl RelayOutcome {
    /// Status class of this outcome.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Deployed(_) | Self::Ignored(_) | Self::NoMatchingService(_) => StatusClass::Success,
            Self::Rejected(e) => e.status_class(),
        }
    }

    /// HTTP status code of this outcome.
    pub fn status_code(&self) -> u16 {
        self.status_class().http_status()
    }

    /// Human-readable summary for the response body.
    pub fn message(&self) -> String {
        match self {
            Self::Deployed(outcome) => format!(
                "Deployment with new image tag {} initiated for {}",
                outcome.tag, outcome.service_name
            ),
            Self::Ignored(reason) => reason.to_string(),
            Self::NoMatchingService(MatchKey::Repository(repo)) => {
                format!("No service configured for repository: {repo}")
            }
            Self::NoMatchingService(MatchKey::Parameter(path)) => {
                format!("No service configuration found for parameter: {path}")
            }
            Self::Rejected(e) => e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler seam
// ---------------------------------------------------------------------------

/// Entry points the front door calls. Object-safe so the listener can hold an
/// `Arc<dyn EventHandler>` without knowing the platform types.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles a package webhook delivery.
    async fn handle_webhook(&self, envelope: &RawEnvelope) -> RelayOutcome;

    /// Handles a parameter-change notification.
    async fn handle_parameter_change(&self, event: &Value) -> RelayOutcome;
}

/// Routes normalised events to the deployment forcer.
pub struct Relay<P, S> {
    registry: Arc<dyn RegistryLookup>,
    forcer: DeploymentForcer<P, S>,
}

impl<P, S> Relay<P, S>
where
    P: OrchestrationPlatform,
    S: ParameterStore,
{
    /// Creates a relay over an already-loaded registry and the platform ports.
    pub fn new(registry: Arc<dyn RegistryLookup>, platform: Arc<P>, parameters: Arc<S>) -> Self {
        Self {
            registry,
            forcer: DeploymentForcer::new(platform, parameters),
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> RelayOutcome {
        let matcher = ServiceMatcher::new(self.registry.as_ref());

        let request = match &event {
            InboundEvent::PackagePublished(package) => {
                let repo = package.repo_name();
                info!(repository = repo, git_ref = ?package.git_ref, "Received package event");
                let Some(service) = matcher.find_by_repo(repo) else {
                    info!(repository = repo, "No service configured for repository");
                    return RelayOutcome::NoMatchingService(MatchKey::Repository(repo.to_owned()));
                };
                let tag = resolver::resolve(package);
                info!(service = %service.name, tag = %tag, "Resolved image tag");
                DeploymentRequest {
                    service: service.clone(),
                    resolved_tag: Some(tag),
                }
            }
            InboundEvent::ParameterChanged(changed) => {
                let parameter = &changed.parameter_name;
                info!(parameter = %parameter, "Received parameter change event");
                let Some(service) = matcher.find_by_parameter(parameter.as_str()) else {
                    info!(parameter = %parameter, "No service configured for parameter");
                    return RelayOutcome::NoMatchingService(MatchKey::Parameter(parameter.clone()));
                };
                DeploymentRequest {
                    service: service.clone(),
                    resolved_tag: None,
                }
            }
        };

        match self.forcer.force(&request).await {
            Ok(outcome) => RelayOutcome::Deployed(outcome),
            Err(e) => {
                error!(service = %request.service.name, error = %e, "Deployment failed");
                RelayOutcome::Rejected(e.into())
            }
        }
    }
}

#[async_trait]
impl<P, S> EventHandler for Relay<P, S>
where
    P: OrchestrationPlatform,
    S: ParameterStore,
{
    async fn handle_webhook(&self, envelope: &RawEnvelope) -> RelayOutcome {
        let span = info_span!("handle_webhook", invocation_id = %InvocationId::new_random());
        async {
            match normalize_webhook(envelope) {
                Ok(Normalized::Event(event)) => self.dispatch(event).await,
                Ok(Normalized::Ignored(reason)) => {
                    info!(%reason, "Ignoring webhook");
                    RelayOutcome::Ignored(reason)
                }
                Err(e) => {
                    error!(error = %e, "Error parsing webhook payload");
                    RelayOutcome::Rejected(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_parameter_change(&self, event: &Value) -> RelayOutcome {
        let span = info_span!("handle_parameter_change", invocation_id = %InvocationId::new_random());
        async {
            match normalize_parameter_change(event) {
                Ok(event) => self.dispatch(event).await,
                Err(e) => {
                    error!(error = %e, "Invalid parameter change event");
                    RelayOutcome::Rejected(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }
}
