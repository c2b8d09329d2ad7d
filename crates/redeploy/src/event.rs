//! Event normalisation: raw envelopes in, canonical [`InboundEvent`]s out.
//!
//! Two triggers reach the engine:
//!
//! - a **package webhook** (GitHub `package` event), delivered through the HTTP
//!   front door as a [`RawEnvelope`] and decoded by [`normalize_webhook`];
//! - a **parameter change** notification (EventBridge-style JSON), decoded by
//!   [`normalize_parameter_change`].
//!
//! The webhook body is loosely typed: `package_version` may be a single object
//! or a list, `repository` may be missing or not an object, and any nested field
//! may be malformed. Each of those shapes is narrowed into an explicit enum case
//! ([`PackageVersionShape`], [`RepositoryShape`]) rather than probed ad hoc, and
//! malformed nested fields below `package_version` default to an empty tag
//! instead of failing the event.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::{BranchName, NormalizationError, ParameterPath};

/// Content type whose `payload` form field carries the JSON document.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Ref prefix marking a feature-branch build.
pub const FEATURE_REF_PREFIX: &str = "refs/heads/feature/";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The transport-level shape of an inbound webhook, as handed over by the
/// front door.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEnvelope {
    /// Request headers in arrival order. Names are matched case-insensitively.
    pub headers: Vec<(String, String)>,
    /// The body exactly as received (still base64-encoded when flagged).
    pub body: String,
    /// Whether `body` is base64-encoded.
    pub is_base64_encoded: bool,
}

impl RawEnvelope {
    /// First header named `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

// ---------------------------------------------------------------------------
// Canonical events
// ---------------------------------------------------------------------------

/// A decoded, classified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A container package version was published.
    PackagePublished(PackagePublished),
    /// A version-tracking parameter changed.
    ParameterChanged(ParameterChanged),
}

/// A container package publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePublished {
    /// `owner/name` of the source repository, or the package name when the
    /// payload carries no repository record.
    pub repo_full_name: String,
    /// Container tags of the published version, in payload order.
    pub tags: Vec<String>,
    /// The git ref the package was built from, if reported.
    pub git_ref: Option<String>,
    /// Classification of `git_ref`.
    pub branch: BranchRef,
}

impl PackagePublished {
    /// The repository name used for matching: the last `/`-separated segment of
    /// [`PackagePublished::repo_full_name`].
    pub fn repo_name(&self) -> &str {
        self.repo_full_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo_full_name)
    }

    /// The first container tag, or `""` when the payload carried none.
    pub fn extracted_tag(&self) -> &str {
        self.tags.first().map_or("", String::as_str)
    }
}

/// Whether a build came from a feature branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchRef {
    /// `refs/heads/feature/<name>` with a non-empty `<name>`.
    Feature(BranchName),
    /// Any other ref, or no ref at all.
    Other,
}

impl BranchRef {
    /// Classifies a git ref.
    pub fn parse(git_ref: Option<&str>) -> Self {
        git_ref
            .and_then(|r| r.strip_prefix(FEATURE_REF_PREFIX))
            .and_then(BranchName::new)
            .map_or(Self::Other, Self::Feature)
    }
}

/// A parameter-store change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterChanged {
    /// Full path of the changed parameter.
    pub parameter_name: ParameterPath,
}

/// Result of normalising a webhook: either an event to act on, or a valid
/// delivery that is irrelevant to deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// An event to route.
    Event(InboundEvent),
    /// Nothing to do; not an error.
    Ignored(IgnoreReason),
}

/// Why a well-formed delivery was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// The payload has no `package.package_version`.
    NotAPackageEvent,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAPackageEvent => f.write_str("Event ignored - not a container package event"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

/// How `package.package_version` was shaped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PackageVersionShape<'a> {
    /// A single version object.
    Single(&'a Map<String, Value>),
    /// A list of versions; only the first is used, the rest are discarded.
    FirstOfSequence(&'a Map<String, Value>),
    /// Present but neither an object nor a list starting with one.
    Unusable,
}

impl<'a> PackageVersionShape<'a> {
    /// Narrows a `package_version` value.
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(version) => Self::Single(version),
            Value::Array(versions) => match versions.first() {
                Some(Value::Object(first)) => Self::FirstOfSequence(first),
                _ => Self::Unusable,
            },
            _ => Self::Unusable,
        }
    }

    /// `metadata.container.tags` of the chosen version. Non-string elements
    /// become `""` so that positions are preserved.
    pub fn container_tags(self) -> Vec<String> {
        let version = match self {
            Self::Single(v) | Self::FirstOfSequence(v) => v,
            Self::Unusable => return Vec::new(),
        };
        version
            .get("metadata")
            .and_then(|m| m.get("container"))
            .and_then(|c| c.get("tags"))
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .map(|tag| tag.as_str().unwrap_or_default().to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// How the top-level `repository` field was shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryShape<'a> {
    /// An object; `full_name` is `""` when missing or not a string.
    Record {
        /// The `full_name` field.
        full_name: &'a str,
    },
    /// Present but null or not an object; the package name is used instead.
    NotARecord,
}

impl<'a> RepositoryShape<'a> {
    /// Narrows a `repository` value. An absent field reads as an empty record.
    pub fn of(value: Option<&'a Value>) -> Self {
        match value {
            None => Self::Record { full_name: "" },
            Some(Value::Object(repo)) => Self::Record {
                full_name: repo.get("full_name").and_then(Value::as_str).unwrap_or(""),
            },
            Some(_) => Self::NotARecord,
        }
    }
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Decodes and classifies a webhook envelope.
///
/// Returns [`Normalized::Ignored`] for well-formed deliveries without a
/// package version, and an error only when the body cannot be read as a JSON
/// object or no repository identifier can be found.
pub fn normalize_webhook(envelope: &RawEnvelope) -> Result<Normalized, NormalizationError> {
    let body = decode_body(envelope)?;
    let payload = parse_payload(&body, envelope.content_type())?;
    classify_package_event(&payload)
}

/// Decodes a parameter-change event, taking the name from `detail.name` or,
/// failing that, from `parameterName`.
pub fn normalize_parameter_change(event: &Value) -> Result<InboundEvent, NormalizationError> {
    let from_detail = event
        .get("detail")
        .and_then(|d| d.get("name"))
        .and_then(Value::as_str);
    let from_top_level = event.get("parameterName").and_then(Value::as_str);

    let parameter_name = from_detail
        .and_then(ParameterPath::new)
        .or_else(|| from_top_level.and_then(ParameterPath::new))
        .ok_or(NormalizationError::MissingParameterName)?;

    Ok(InboundEvent::ParameterChanged(ParameterChanged { parameter_name }))
}

/// Parses a raw parameter-change body and decodes it.
pub fn parse_parameter_change(body: &str) -> Result<InboundEvent, NormalizationError> {
    let event: Value =
        serde_json::from_str(body).map_err(|e| NormalizationError::InvalidPayload(e.to_string()))?;
    normalize_parameter_change(&event)
}

fn decode_body(envelope: &RawEnvelope) -> Result<Cow<'_, str>, NormalizationError> {
    if !envelope.is_base64_encoded {
        return Ok(Cow::Borrowed(&envelope.body));
    }
    let bytes = STANDARD
        .decode(envelope.body.trim())
        .map_err(|e| NormalizationError::InvalidBase64(e.to_string()))?;
    String::from_utf8(bytes)
        .map(Cow::Owned)
        .map_err(|e| NormalizationError::InvalidPayload(e.to_string()))
}

fn parse_payload(
    body: &str,
    content_type: Option<&str>,
) -> Result<Map<String, Value>, NormalizationError> {
    let is_form = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains(FORM_CONTENT_TYPE));

    let json_text: Cow<'_, str> = if is_form {
        url::form_urlencoded::parse(body.as_bytes())
            .find(|(key, _)| key == "payload")
            .map_or(Cow::Borrowed(body), |(_, value)| Cow::Owned(value.into_owned()))
    } else {
        Cow::Borrowed(body)
    };

    match serde_json::from_str(&json_text) {
        Ok(Value::Object(payload)) => Ok(payload),
        Ok(other) => Err(NormalizationError::InvalidPayload(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(NormalizationError::InvalidPayload(e.to_string())),
    }
}

fn classify_package_event(payload: &Map<String, Value>) -> Result<Normalized, NormalizationError> {
    let Some(package) = payload.get("package").and_then(Value::as_object) else {
        return Ok(Normalized::Ignored(IgnoreReason::NotAPackageEvent));
    };
    let Some(version) = package.get("package_version").filter(|v| is_present(v)) else {
        return Ok(Normalized::Ignored(IgnoreReason::NotAPackageEvent));
    };

    let repo_full_name = match RepositoryShape::of(payload.get("repository")) {
        RepositoryShape::Record { full_name } => full_name,
        RepositoryShape::NotARecord => package.get("name").and_then(Value::as_str).unwrap_or(""),
    };
    if repo_full_name.is_empty() {
        return Err(NormalizationError::MissingRepository);
    }

    let git_ref = payload
        .get("ref")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_owned);
    let branch = BranchRef::parse(git_ref.as_deref());

    Ok(Normalized::Event(InboundEvent::PackagePublished(
        PackagePublished {
            repo_full_name: repo_full_name.to_owned(),
            tags: PackageVersionShape::of(version).container_tags(),
            git_ref,
            branch,
        },
    )))
}

/// A field counts as present when it is non-null and non-empty.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
