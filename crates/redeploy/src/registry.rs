//! The service registry: logical service name → deployment target.
//!
//! Loaded once per process from external configuration and read-only
//! thereafter. Two document shapes are accepted:
//!
//! - the `SERVICE_MAP` JSON object written by the infrastructure templates:
//!
//!   ```json
//!   { "widget": { "parameter_name": "/version/ecs/widget/widget",
//!                 "service_config": { "cluster_name": "c1", "service_name": "s1",
//!                                     "container_name": "app", "github_repo": "widget" } } }
//!   ```
//!
//! - a TOML file with one `[[services]]` table per entry.
//!
//! Both reject duplicate service names instead of letting the last one win.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::{
    ClusterName, ContainerName, EcsServiceName, ParameterPath, RegistryError, ServiceKey,
    SourceRepo,
};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One deployable service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEntry {
    /// Unique registry key.
    pub name: ServiceKey,
    /// Cluster hosting the service.
    pub cluster_name: ClusterName,
    /// Service name as known to the platform.
    pub service_name: EcsServiceName,
    /// Container whose image is rewritten.
    pub container_name: ContainerName,
    /// Repository whose package events deploy this service.
    pub source_repo: SourceRepo,
    /// Parameter whose change events deploy this service, if configured.
    pub parameter_path: Option<ParameterPath>,
}

impl ServiceEntry {
    /// Path in the parameter store holding the tag to deploy:
    /// `/version/ecs/<name>/<source_repo>`.
    pub fn version_parameter_path(&self) -> ParameterPath {
        ParameterPath::version_path(&self.name, &self.source_repo)
    }
}

// ---------------------------------------------------------------------------
// Lookup seam
// ---------------------------------------------------------------------------

/// Read-only view of the registry consumed by the matcher and relay.
pub trait RegistryLookup: Send + Sync {
    /// All entries, in configuration order.
    fn entries(&self) -> &[ServiceEntry];

    /// The entry whose key equals `key` exactly.
    fn get(&self, key: &str) -> Option<&ServiceEntry> {
        self.entries().iter().find(|e| e.name.as_str() == key)
    }
}

/// The loaded registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
}

impl ServiceRegistry {
    /// Builds a registry, rejecting duplicate names.
    pub fn from_entries(entries: Vec<ServiceEntry>) -> Result<Self, RegistryError> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(RegistryError::DuplicateService {
                    name: entry.name.to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Parses the `SERVICE_MAP` JSON object.
    pub fn from_service_map_json(json: &str) -> Result<Self, RegistryError> {
        let OrderedEntries(raw) =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse(e.to_string()))?;

        let entries = raw
            .into_iter()
            .map(|(name, entry)| {
                let config = entry.service_config.unwrap_or_default();
                build_entry(RawFields {
                    name,
                    cluster_name: config.cluster_name,
                    service_name: config.service_name,
                    container_name: config.container_name,
                    source_repo: config.github_repo,
                    parameter_path: entry.parameter_name,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_entries(entries)
    }

    /// Parses a TOML document of `[[services]]` tables.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile =
            toml::from_str(toml_str).map_err(|e| RegistryError::Parse(e.to_string()))?;

        let entries = file
            .services
            .into_iter()
            .map(|s| {
                build_entry(RawFields {
                    name: s.name.unwrap_or_default(),
                    cluster_name: s.cluster_name,
                    service_name: s.service_name,
                    container_name: s.container_name,
                    source_repo: s.source_repo,
                    parameter_path: s.parameter_path,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_entries(entries)
    }

    /// Number of configured services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no services are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegistryLookup for ServiceRegistry {
    fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }
}

// ---------------------------------------------------------------------------
// Raw document shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawServiceConfig {
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    github_repo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMapEntry {
    #[serde(default)]
    parameter_name: Option<String>,
    #[serde(default)]
    service_config: Option<RawServiceConfig>,
}

/// The `SERVICE_MAP` object, with keys kept in order and duplicates preserved
/// so they can be reported instead of silently collapsed.
struct OrderedEntries(Vec<(String, RawMapEntry)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of service name to service configuration")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, RawMapEntry>()? {
                    entries.push(entry);
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    services: Vec<RawTomlEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTomlEntry {
    name: Option<String>,
    cluster_name: Option<String>,
    service_name: Option<String>,
    container_name: Option<String>,
    source_repo: Option<String>,
    parameter_path: Option<String>,
}

struct RawFields {
    name: String,
    cluster_name: Option<String>,
    service_name: Option<String>,
    container_name: Option<String>,
    source_repo: Option<String>,
    parameter_path: Option<String>,
}

fn build_entry(raw: RawFields) -> Result<ServiceEntry, RegistryError> {
    let name = ServiceKey::new(raw.name.clone()).ok_or_else(|| RegistryError::InvalidEntry {
        name: raw.name.clone(),
        field: "name",
    })?;
    let invalid = |field: &'static str| RegistryError::InvalidEntry {
        name: raw.name.clone(),
        field,
    };

    Ok(ServiceEntry {
        cluster_name: raw
            .cluster_name
            .and_then(ClusterName::new)
            .ok_or_else(|| invalid("cluster_name"))?,
        service_name: raw
            .service_name
            .and_then(EcsServiceName::new)
            .ok_or_else(|| invalid("service_name"))?,
        container_name: raw
            .container_name
            .and_then(ContainerName::new)
            .ok_or_else(|| invalid("container_name"))?,
        source_repo: raw
            .source_repo
            .and_then(SourceRepo::new)
            .ok_or_else(|| invalid("source_repo"))?,
        parameter_path: raw.parameter_path.and_then(ParameterPath::new),
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_MAP: &str = r#"{
        "widget": {
            "parameter_name": "/custom/widget-version",
            "service_config": {
                "cluster_name": "c1",
                "service_name": "s1",
                "container_name": "app",
                "github_repo": "widget"
            }
        },
        "gadget": {
            "service_config": {
                "cluster_name": "c2",
                "service_name": "s2",
                "container_name": "web",
                "github_repo": "Org-Gadget"
            }
        }
    }"#;

    #[test]
    fn test_service_map_json_loads_in_order() {
        let registry = ServiceRegistry::from_service_map_json(SERVICE_MAP).expect("registry");

        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["widget", "gadget"]);

        let widget = registry.get("widget").expect("widget");
        assert_eq!(widget.cluster_name.as_str(), "c1");
        assert_eq!(widget.container_name.as_str(), "app");
        assert_eq!(
            widget.parameter_path.as_ref().map(ParameterPath::as_str),
            Some("/custom/widget-version")
        );
        assert!(registry.get("gadget").expect("gadget").parameter_path.is_none());
    }

    #[test]
    fn test_service_map_rejects_duplicate_keys() {
        let json = r#"{
            "a": {"service_config": {"cluster_name": "c", "service_name": "s", "container_name": "x", "github_repo": "r"}},
            "a": {"service_config": {"cluster_name": "c", "service_name": "s", "container_name": "x", "github_repo": "r"}}
        }"#;

        assert_eq!(
            ServiceRegistry::from_service_map_json(json),
            Err(RegistryError::DuplicateService { name: "a".into() })
        );
    }

    #[test]
    fn test_service_map_rejects_missing_field() {
        let json = r#"{"a": {"service_config": {"cluster_name": "c", "service_name": "s", "github_repo": "r"}}}"#;

        assert_eq!(
            ServiceRegistry::from_service_map_json(json),
            Err(RegistryError::InvalidEntry {
                name: "a".into(),
                field: "container_name"
            })
        );
    }

    #[test]
    fn test_service_map_rejects_non_object() {
        assert!(matches!(
            ServiceRegistry::from_service_map_json("[1, 2]"),
            Err(RegistryError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_service_map_is_valid() {
        let registry = ServiceRegistry::from_service_map_json("{}").expect("registry");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_toml_registry() {
        let toml_str = r#"
            [[services]]
            name = "widget"
            cluster_name = "c1"
            service_name = "s1"
            container_name = "app"
            source_repo = "widget"

            [[services]]
            name = "gadget"
            cluster_name = "c2"
            service_name = "s2"
            container_name = "web"
            source_repo = "gadget"
            parameter_path = "/custom/gadget"
        "#;

        let registry = ServiceRegistry::from_toml_str(toml_str).expect("registry");
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("gadget").and_then(|e| e.parameter_path.clone()),
            ParameterPath::new("/custom/gadget")
        );
    }

    #[test]
    fn test_toml_registry_rejects_duplicates() {
        let toml_str = r#"
            [[services]]
            name = "widget"
            cluster_name = "c1"
            service_name = "s1"
            container_name = "app"
            source_repo = "widget"

            [[services]]
            name = "widget"
            cluster_name = "c2"
            service_name = "s2"
            container_name = "app"
            source_repo = "other"
        "#;

        assert_eq!(
            ServiceRegistry::from_toml_str(toml_str),
            Err(RegistryError::DuplicateService {
                name: "widget".into()
            })
        );
    }

    #[test]
    fn test_version_parameter_path() {
        let registry = ServiceRegistry::from_service_map_json(SERVICE_MAP).expect("registry");
        let gadget = registry.get("gadget").expect("gadget");
        assert_eq!(
            gadget.version_parameter_path().as_str(),
            "/version/ecs/gadget/Org-Gadget"
        );
    }
}
