//! Redeployer event source infrastructure.
//!
//! Receives events over HTTP and hands them to a [`redeploy::EventHandler`]:
//!
//! | Route | Event |
//! |-------|-------|
//! | `POST /webhook` | GitHub package webhook (signature-checked) |
//! | `POST /events/parameter` | EventBridge-style parameter-change notification |
//! | `POST /invoke` | A raw Lambda-style event, classified like the hosted function |
//! | `GET /healthz` | Liveness |
//!
//! Every response is JSON `{"status": <code>, "message": <text>}` with the
//! same status code on the HTTP response.
//!
//! ## Deployment Scenarios
//!
//! | Scenario | Entry point | Notes |
//! |----------|-------------|-------|
//! | Long-running service | [`serve`] | Behind a load balancer or function URL proxy |
//! | Single-shot | [`Dispatcher::invoke`] | Used by `redeployer invoke` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details and signature verification live
//! here. The [`redeploy`] crate sees only [`redeploy::RawEnvelope`] and
//! parameter-change JSON.

mod dispatch;
mod error;
mod server;
mod signature;

pub use dispatch::{Dispatcher, Invocation, LambdaResponse, Reply};
pub use error::{ListenerError, UnknownPolicy};
pub use server::{router, serve};
pub use signature::{
    check_signature, SignatureCheck, SignatureVerifier, VerificationPolicy, SIGNATURE_HEADER,
};
