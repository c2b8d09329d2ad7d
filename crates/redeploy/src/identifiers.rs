//! Newtype domain identifiers.
//!
//! Every configuration or platform name the engine handles is a distinct
//! newtype wrapping a `String`. This prevents accidentally interchanging, for
//! example, the registry key of a service ([`ServiceKey`]) with the name the
//! orchestration platform knows it by ([`EcsServiceName`]), even though both
//! are plain strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single handled event (one webhook delivery or one parameter
/// change notification).
///
/// Generated fresh for every invocation and recorded on its tracing span so all
/// log lines and platform calls belonging to one event can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (registry configuration)
// ---------------------------------------------------------------------------

string_id! {
    /// The unique registry key of a deployable service (e.g. `"widget"`).
    ///
    /// Also forms the third segment of the version parameter path
    /// `/version/ecs/<key>/<repo>`.
    ServiceKey
}

string_id! {
    /// Name of the orchestration cluster hosting a service.
    ClusterName
}

string_id! {
    /// Name of the service as known to the orchestration platform.
    ///
    /// Distinct from [`ServiceKey`]: the registry key is our label, this is the
    /// platform's.
    EcsServiceName
}

string_id! {
    /// Name of the container definition whose image is rewritten on deploy.
    ContainerName
}

string_id! {
    /// Source repository a service is built from (e.g. `"widget"`).
    ///
    /// Matched case-insensitively against the repository named in a package
    /// webhook.
    SourceRepo
}

string_id! {
    /// A path in the versioned parameter store (e.g. `"/version/ecs/widget/widget"`).
    ParameterPath
}

impl ParameterPath {
    /// The structural version path `/version/ecs/<service>/<repo>`.
    pub fn version_path(service: &ServiceKey, repo: &SourceRepo) -> Self {
        Self(format!("{VERSION_PARAMETER_PREFIX}{service}/{repo}"))
    }
}

/// Prefix of the structural version parameter path `/version/ecs/<service>/<repo>`.
pub const VERSION_PARAMETER_PREFIX: &str = "/version/ecs/";

string_id! {
    /// ARN of a task definition revision.
    TaskDefinitionArn
}

string_id! {
    /// The branch-name remainder of a `refs/heads/feature/<name>` ref.
    BranchName
}

// ---------------------------------------------------------------------------
// Image tags
// ---------------------------------------------------------------------------

/// Maximum length of a container image tag accepted by OCI registries.
const MAX_TAG_LEN: usize = 128;

/// A container image tag that is safe to write into a task definition.
///
/// Unlike the other identifiers, construction validates the registry tag
/// grammar `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}` in addition to non-emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageTag(String);

impl ImageTag {
    /// Parses an image tag, returning `None` if it is empty, too long, or
    /// contains characters the registry would reject.
    pub fn parse(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let mut chars = v.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if first_ok && rest_ok && v.len() <= MAX_TAG_LEN {
            Some(Self(v))
        } else {
            None
        }
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_reject_empty() {
        assert!(ServiceKey::new("").is_none());
        assert!(ClusterName::new("").is_none());
        assert_eq!(ServiceKey::new("widget").map(|k| k.to_string()), Some("widget".into()));
    }

    #[test]
    fn test_image_tag_accepts_registry_grammar() {
        for tag in ["abc123", "v2", "feature-login", "1.2.3", "_build", "sha-0f3a_rc.1"] {
            assert!(ImageTag::parse(tag).is_some(), "{tag} should be valid");
        }
    }

    #[test]
    fn test_image_tag_rejects_invalid() {
        assert!(ImageTag::parse("").is_none());
        assert!(ImageTag::parse("-leading-dash").is_none());
        assert!(ImageTag::parse(".leading-dot").is_none());
        assert!(ImageTag::parse("feature-foo/bar").is_none());
        assert!(ImageTag::parse("has space").is_none());
        assert!(ImageTag::parse("a".repeat(129)).is_none());
        assert!(ImageTag::parse("a".repeat(128)).is_some());
    }

    #[test]
    fn test_invocation_ids_are_unique() {
        assert_ne!(InvocationId::new_random(), InvocationId::new_random());
    }
}
