//! Transport-neutral request handling shared by the HTTP routes and the
//! single-shot `invoke` mode.
//!
//! A Lambda-style invocation is classified the same way the hosted function
//! was: an event carrying `requestContext.http` is an HTTP delivery (a package
//! webhook); anything else is a parameter-change notification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use redeploy::{EventHandler, RawEnvelope, RelayOutcome};

use crate::{ListenerError, SignatureVerifier};

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// The JSON body of every front-door response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Human-readable summary.
    pub message: String,
}

impl From<&RelayOutcome> for Reply {
    fn from(outcome: &RelayOutcome) -> Self {
        Self {
            status: outcome.status_code(),
            message: outcome.message(),
        }
    }
}

impl From<&ListenerError> for Reply {
    fn from(error: &ListenerError) -> Self {
        Self {
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

/// The response shape a Lambda function URL or API gateway expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaResponse {
    /// HTTP status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded `{"message": ...}`.
    pub body: String,
}

impl From<&Reply> for LambdaResponse {
    fn from(reply: &Reply) -> Self {
        Self {
            status_code: reply.status,
            body: serde_json::json!({ "message": reply.message }).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation classification
// ---------------------------------------------------------------------------

/// A Lambda-style event after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// An HTTP delivery.
    Webhook(RawEnvelope),
    /// Anything else, treated as a parameter-change notification.
    ParameterChange(Value),
}

impl Invocation {
    /// Classifies a raw Lambda-style event.
    pub fn classify(event: Value) -> Self {
        let is_http = event
            .get("requestContext")
            .and_then(|rc| rc.get("http"))
            .is_some();
        if !is_http {
            return Self::ParameterChange(event);
        }

        let headers = event
            .get("headers")
            .and_then(Value::as_object)
            .map(header_pairs)
            .unwrap_or_default();
        let body = event
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let is_base64_encoded = event
            .get("isBase64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self::Webhook(RawEnvelope {
            headers,
            body,
            is_base64_encoded,
        })
    }
}

fn header_pairs(headers: &Map<String, Value>) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_owned())))
        .collect()
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Verifies deliveries and hands them to the relay.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    verifier: SignatureVerifier,
}

impl Dispatcher {
    /// Creates a dispatcher over `handler`.
    pub fn new(handler: Arc<dyn EventHandler>, verifier: SignatureVerifier) -> Self {
        Self { handler, verifier }
    }

    /// Handles a package webhook delivery.
    pub async fn webhook(&self, envelope: &RawEnvelope) -> Reply {
        if let Err(e) = self.verifier.verify(envelope).await {
            return Reply::from(&e);
        }
        Reply::from(&self.handler.handle_webhook(envelope).await)
    }

    /// Handles a parameter-change notification.
    pub async fn parameter_change(&self, event: &Value) -> Reply {
        Reply::from(&self.handler.handle_parameter_change(event).await)
    }

    /// Handles one Lambda-style event.
    pub async fn invoke(&self, event: Value) -> Reply {
        match Invocation::classify(event) {
            Invocation::Webhook(envelope) => {
                info!(kind = "webhook", "Dispatching invocation");
                self.webhook(&envelope).await
            }
            Invocation::ParameterChange(event) => {
                info!(kind = "parameter_change", "Dispatching invocation");
                self.parameter_change(&event).await
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}
