//! The axum HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info;

use redeploy::RawEnvelope;

use crate::{Dispatcher, ListenerError, Reply};

/// Builds the router: `POST /webhook`, `POST /events/parameter`,
/// `POST /invoke` and `GET /healthz`.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .route("/events/parameter", post(parameter_event))
        .route("/invoke", post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(dispatcher))
}

/// Binds `address` and serves until `shutdown` resolves.
pub async fn serve<F>(address: SocketAddr, dispatcher: Dispatcher, shutdown: F) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;
    info!(address = %address, "Listening for events");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ListenerError {
    fn into_response(self) -> Response {
        Reply::from(&self).into_response()
    }
}

async fn healthz() -> Reply {
    Reply {
        status: 200,
        message: "ok".to_owned(),
    }
}

async fn webhook(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Reply, ListenerError> {
    let body = String::from_utf8(body.to_vec()).map_err(|e| ListenerError::InvalidBody(e.to_string()))?;
    let envelope = RawEnvelope {
        headers: header_pairs(&headers),
        body,
        is_base64_encoded: false,
    };
    Ok(dispatcher.webhook(&envelope).await)
}

async fn parameter_event(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Bytes,
) -> Result<Reply, ListenerError> {
    let event = parse_json(&body)?;
    Ok(dispatcher.parameter_change(&event).await)
}

async fn invoke(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Result<Reply, ListenerError> {
    let event = parse_json(&body)?;
    Ok(dispatcher.invoke(event).await)
}

fn parse_json(body: &[u8]) -> Result<Value, ListenerError> {
    serde_json::from_slice(body).map_err(|e| ListenerError::InvalidBody(e.to_string()))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use redeploy::testing::{
        FakeTaskDefinition, InMemoryParameterStore, InMemoryPlatform, StaticSecretProvider,
    };
    use redeploy::{Relay, ServiceRegistry};
    use serde_json::json;
    use sha2::Sha256;
    use tower::ServiceExt;

    use super::*;
    use crate::{SignatureVerifier, VerificationPolicy};

    const SECRET: &str = "topsecret";

    struct TestApp {
        router: Router,
        platform: Arc<InMemoryPlatform>,
    }

    fn app(policy: VerificationPolicy) -> TestApp {
        let registry = ServiceRegistry::from_service_map_json(
            r#"{"widget": {"service_config": {"cluster_name": "c1", "service_name": "s1", "container_name": "app", "github_repo": "widget"}}}"#,
        )
        .expect("registry");

        let platform = InMemoryPlatform::new();
        platform.add_service(
            "c1",
            "s1",
            FakeTaskDefinition::new("widget").with_container("app", "ghcr.io/org/widget:old"),
        );
        let platform = Arc::new(platform);
        let parameters = Arc::new(InMemoryParameterStore::new());
        parameters.put("/version/ecs/widget/widget", "v2.1.0");

        let relay = Relay::new(Arc::new(registry), Arc::clone(&platform), parameters);
        let verifier = SignatureVerifier::new(
            policy,
            Arc::new(StaticSecretProvider(Some(SECRET.to_owned()))),
        );

        TestApp {
            router: router(Dispatcher::new(Arc::new(relay), verifier)),
            platform,
        }
    }

    fn sign(body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
        mac.update(body.as_bytes());
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn package_body(tag: &str) -> String {
        json!({
            "action": "published",
            "package": {"package_version": {"metadata": {"container": {"tags": [tag]}}}},
            "repository": {"full_name": "org/widget"}
        })
        .to_string()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Reply) {
        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("reply json"))
    }

    fn post(uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = app(VerificationPolicy::WarnOnly);
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.message, "ok");
    }

    #[tokio::test]
    async fn test_signed_webhook_deploys() {
        let app = app(VerificationPolicy::Enforce);
        let body = package_body("abc123");
        let request = post("/webhook")
            .header("x-hub-signature-256", sign(&body))
            .body(Body::from(body))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply.message,
            "Deployment with new image tag abc123 initiated for widget"
        );
        assert_eq!(
            app.platform.registered()[0].image_of("app"),
            Some("ghcr.io/org/widget:abc123")
        );
    }

    #[tokio::test]
    async fn test_enforce_rejects_unsigned_webhook() {
        let app = app(VerificationPolicy::Enforce);
        let body = package_body("abc123");
        let request = post("/webhook")
            .body(Body::from(body))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.status, 401);
        assert_eq!(app.platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_warn_only_processes_badly_signed_webhook() {
        let app = app(VerificationPolicy::WarnOnly);
        let body = package_body("abc123");
        let request = post("/webhook")
            .header("x-hub-signature-256", "sha256=deadbeef")
            .body(Body::from(body))
            .expect("request");

        let (status, _) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.platform.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_non_package_webhook_is_ignored() {
        let app = app(VerificationPolicy::WarnOnly);
        let body = json!({"zen": "Keep it logically awesome."}).to_string();
        let request = post("/webhook")
            .body(Body::from(body))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.message, "Event ignored - not a container package event");
        assert_eq!(app.platform.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_json_webhook_is_bad_request() {
        let app = app(VerificationPolicy::WarnOnly);
        let request = post("/webhook")
            .body(Body::from("not json"))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply.message.starts_with("Invalid JSON payload"));
    }

    #[tokio::test]
    async fn test_parameter_event_route() {
        let app = app(VerificationPolicy::Enforce);
        let body = json!({"detail": {"name": "/version/ecs/widget/widget"}}).to_string();
        let request = post("/events/parameter")
            .body(Body::from(body))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply.message,
            "Deployment with new image tag v2.1.0 initiated for widget"
        );
    }

    #[tokio::test]
    async fn test_parameter_event_route_rejects_non_json() {
        let app = app(VerificationPolicy::WarnOnly);
        let request = post("/events/parameter")
            .body(Body::from("{"))
            .expect("request");

        let (status, _) = send(app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invoke_route_dispatches_http_events_as_webhooks() {
        let app = app(VerificationPolicy::Enforce);
        let payload = package_body("v3");
        let event = json!({
            "requestContext": {"http": {"method": "POST"}},
            "headers": {"content-type": "application/json", "x-hub-signature-256": sign(&payload)},
            "body": payload,
            "isBase64Encoded": false
        })
        .to_string();
        let request = post("/invoke")
            .body(Body::from(event))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.message, "Deployment with new image tag v3 initiated for widget");
    }

    #[tokio::test]
    async fn test_invoke_route_dispatches_other_events_as_parameter_changes() {
        let app = app(VerificationPolicy::Enforce);
        let event = json!({"parameterName": "/unknown/parameter"}).to_string();
        let request = post("/invoke")
            .body(Body::from(event))
            .expect("request");

        let (status, reply) = send(app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply.message,
            "No service configuration found for parameter: /unknown/parameter"
        );
        assert_eq!(app.platform.call_count(), 0);
    }
}
