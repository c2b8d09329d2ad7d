//! Redeployer CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: flags and environment variables (with `.env`
//!    support), then load and validate the service registry. An invalid
//!    registry aborts start-up.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or pretty layer
//!    and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the AWS adapters, injected into the
//!    [`redeploy::Relay`] and the [`listener::Dispatcher`].
//! 4. **Select trigger mode**:
//!    - `serve`: run the HTTP front door until Ctrl-C.
//!    - `invoke`: handle one Lambda-style event from a file or stdin and
//!      print the Lambda-shaped response.

mod config;
mod telemetry;

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use aws::AwsClients;
use listener::{Dispatcher, LambdaResponse, SignatureVerifier, VerificationPolicy};
use redeploy::{RegistryLookup, Relay, ServiceRegistry};

use crate::config::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format)?;

    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = ?e, "Redeployer failed");
    }

    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let registry = cli.load_registry()?;
    log_registry(&registry);

    if cli.signature_policy == VerificationPolicy::WarnOnly {
        warn!(
            policy = %cli.signature_policy,
            "Webhook signatures are not enforced; unsigned or mis-signed deliveries will be processed. \
             Set WEBHOOK_SIGNATURE_POLICY=enforce to reject them"
        );
    }

    let clients = AwsClients::load(cli.region.clone(), cli.secret_arn.clone()).await;
    let relay = Relay::new(
        Arc::new(registry),
        Arc::new(clients.platform),
        Arc::new(clients.parameters),
    );
    let verifier = SignatureVerifier::new(cli.signature_policy, Arc::new(clients.secrets));
    let dispatcher = Dispatcher::new(Arc::new(relay), verifier);

    match cli.command {
        Command::Serve { bind } => {
            listener::serve(bind, dispatcher, shutdown_signal()).await?;
            info!("Server stopped");
        }
        Command::Invoke { event } => {
            let event = read_event(&event)?;
            let reply = dispatcher.invoke(event).await;
            println!("{}", serde_json::to_string_pretty(&LambdaResponse::from(&reply))?);
        }
    }
    Ok(())
}

fn log_registry(registry: &ServiceRegistry) {
    if registry.is_empty() {
        warn!("Service registry is empty; every event will be a no-op");
    }
    for entry in registry.entries() {
        info!(
            service = %entry.name,
            cluster = %entry.cluster_name,
            ecs_service = %entry.service_name,
            container = %entry.container_name,
            source_repo = %entry.source_repo,
            "Registered service"
        );
    }
}

fn read_event(source: &str) -> anyhow::Result<serde_json::Value> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read event from stdin")?;
        text
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read event file {source}"))?
    };
    serde_json::from_str(&text).context("Event is not valid JSON")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
