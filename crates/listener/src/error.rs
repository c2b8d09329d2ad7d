use std::net::SocketAddr;

use thiserror::Error;

use crate::SignatureCheck;

/// Errors raised by the front door itself, before or around the relay.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Signature verification failed under the `enforce` policy.
    #[error("Webhook signature rejected: {0}")]
    Unauthorized(SignatureCheck),

    /// The request body could not be read as text or JSON.
    #[error("Invalid JSON payload: {0}")]
    InvalidBody(String),

    /// The listening socket could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// The requested address.
        address: SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl ListenerError {
    /// HTTP status code reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::InvalidBody(_) => 400,
            Self::Bind { .. } | Self::Serve(_) => 500,
        }
    }
}

/// An unrecognised `WEBHOOK_SIGNATURE_POLICY` value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown signature policy '{0}' (expected 'enforce' or 'warn-only')")]
pub struct UnknownPolicy(pub String);
