//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its environment variable;
//! a `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use listener::VerificationPolicy;
use redeploy::ServiceRegistry;

/// Redeploys container services when a new image is published.
#[derive(Debug, Parser)]
#[command(name = "redeployer", version, about, long_about = None)]
pub struct Cli {
    /// Service registry as JSON, keyed by service name.
    #[arg(long, env = "SERVICE_MAP", hide_env_values = true)]
    pub service_map: Option<String>,

    /// Service registry TOML file with `[[services]]` tables. Takes precedence
    /// over `--service-map`.
    #[arg(long, env = "SERVICE_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Secrets Manager ARN of the secret holding `webhook_secret`.
    #[arg(long, env = "GITHUB_CREDENTIALS_SECRET_ARN")]
    pub secret_arn: Option<String>,

    /// What to do with webhooks whose signature cannot be verified.
    #[arg(long, env = "WEBHOOK_SIGNATURE_POLICY", default_value_t = VerificationPolicy::WarnOnly)]
    pub signature_policy: VerificationPolicy,

    /// AWS region override; the default provider chain is used otherwise.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Trigger mode.
    #[command(subcommand)]
    pub command: Command,
}

/// Trigger modes.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP front door until interrupted.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
    /// Process one Lambda-style event and print the response.
    Invoke {
        /// Path of the event JSON, or `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl Cli {
    /// Loads the service registry from `--registry` or `--service-map`.
    pub fn load_registry(&self) -> anyhow::Result<ServiceRegistry> {
        if let Some(path) = &self.registry {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry file {}", path.display()))?;
            return ServiceRegistry::from_toml_str(&text)
                .with_context(|| format!("Invalid registry file {}", path.display()));
        }

        match &self.service_map {
            Some(json) => ServiceRegistry::from_service_map_json(json).context("Invalid SERVICE_MAP"),
            None => bail!("No service registry configured: set SERVICE_MAP or pass --registry <file.toml>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_MAP: &str = r#"{"widget": {"service_config": {"cluster_name": "c1", "service_name": "s1", "container_name": "app", "github_repo": "widget"}}}"#;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::parse_from(["redeployer", "--service-map", SERVICE_MAP, "serve"]);

        assert_eq!(cli.signature_policy, VerificationPolicy::WarnOnly);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.command,
            Command::Serve {
                bind: "0.0.0.0:8080".parse().expect("addr")
            }
        );
    }

    #[test]
    fn test_invoke_with_options() {
        let cli = Cli::parse_from([
            "redeployer",
            "--signature-policy",
            "enforce",
            "--log-format",
            "pretty",
            "invoke",
            "--event",
            "event.json",
        ]);

        assert_eq!(cli.signature_policy, VerificationPolicy::Enforce);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert_eq!(
            cli.command,
            Command::Invoke {
                event: "event.json".into()
            }
        );
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = Cli::try_parse_from(["redeployer", "--signature-policy", "strict", "serve"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_registry_from_service_map() {
        let cli = Cli::parse_from(["redeployer", "--service-map", SERVICE_MAP, "serve"]);
        let registry = cli.load_registry().expect("registry");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_registry_from_toml_file() {
        let path = std::env::temp_dir().join(format!("redeployer-registry-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[[services]]
name = "widget"
cluster_name = "c1"
service_name = "s1"
container_name = "app"
source_repo = "widget"
"#,
        )
        .expect("write registry");

        let cli = Cli::parse_from([
            "redeployer",
            "--registry",
            path.to_str().expect("utf-8 path"),
            "--service-map",
            "not json",
            "serve",
        ]);
        let registry = cli.load_registry();
        std::fs::remove_file(&path).ok();

        assert_eq!(registry.expect("registry").len(), 1);
    }

    #[test]
    fn test_invalid_service_map_fails() {
        let cli = Cli::parse_from(["redeployer", "--service-map", "[]", "serve"]);
        assert!(cli.load_registry().is_err());
    }
}
