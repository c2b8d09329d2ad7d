//! Matching inbound events to registry entries.
//!
//! Absence of a match is a normal outcome (`None`), never an error: most
//! repositories publishing packages are simply not deployed by this service.

use crate::{RegistryLookup, ServiceEntry, VERSION_PARAMETER_PREFIX};

/// Finds the registry entry an event targets.
#[derive(Clone, Copy)]
pub struct ServiceMatcher<'a> {
    registry: &'a dyn RegistryLookup,
}

impl<'a> ServiceMatcher<'a> {
    /// Creates a matcher over `registry`.
    pub fn new(registry: &'a dyn RegistryLookup) -> Self {
        Self { registry }
    }

    /// The first entry whose `source_repo` equals `repo_name`, ignoring case.
    pub fn find_by_repo(&self, repo_name: &str) -> Option<&'a ServiceEntry> {
        self.registry
            .entries()
            .iter()
            .find(|e| e.source_repo.as_str().to_lowercase() == repo_name.to_lowercase())
    }

    /// The entry whose configured `parameter_path` equals `parameter_name`; if
    /// none does and the name has the shape `/version/ecs/<service>/<repo>`,
    /// the entry keyed `<service>`.
    pub fn find_by_parameter(&self, parameter_name: &str) -> Option<&'a ServiceEntry> {
        let registry = self.registry;
        registry
            .entries()
            .iter()
            .find(|e| {
                e.parameter_path
                    .as_ref()
                    .is_some_and(|p| p.as_str() == parameter_name)
            })
            .or_else(|| {
                let (service, _repo) = split_version_path(parameter_name)?;
                registry.get(service)
            })
    }
}

/// Splits `/version/ecs/<service>/<repo>` into its two non-empty segments.
fn split_version_path(parameter_name: &str) -> Option<(&str, &str)> {
    let rest = parameter_name.strip_prefix(VERSION_PARAMETER_PREFIX)?;
    let (service, repo) = rest.split_once('/')?;
    (!service.is_empty() && !repo.is_empty()).then_some((service, repo))
}
