//! Webhook signature verification.
//!
//! GitHub signs each delivery with `X-Hub-Signature-256: sha256=<hex>`, an
//! HMAC-SHA256 of the body under the shared webhook secret. The MAC is
//! computed over the body exactly as received: for a base64-flagged Lambda
//! envelope that is the still-encoded string.
//!
//! What happens on failure is a [`VerificationPolicy`] decision. `WarnOnly`
//! lets every delivery through and logs the gap; `Enforce` rejects.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use redeploy::{RawEnvelope, SecretProvider};

use crate::{ListenerError, UnknownPolicy};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What to do when a delivery cannot be verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Reject unverifiable deliveries with `401`.
    Enforce,
    /// Log unverifiable deliveries at `warn` and process them anyway.
    #[default]
    WarnOnly,
}

impl fmt::Display for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enforce => "enforce",
            Self::WarnOnly => "warn-only",
        })
    }
}

impl FromStr for VerificationPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "warn-only" | "warn_only" | "warn" => Ok(Self::WarnOnly),
            _ => Err(UnknownPolicy(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Checking
// ---------------------------------------------------------------------------

/// Result of checking one delivery's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The signature matches.
    Valid,
    /// No webhook secret is available.
    MissingSecret,
    /// The delivery carries no signature header.
    MissingHeader,
    /// The header is not `sha256=<hex>`.
    Malformed,
    /// The signature does not match the body.
    Mismatch,
}

impl fmt::Display for SignatureCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Valid => "valid",
            Self::MissingSecret => "no webhook secret configured",
            Self::MissingHeader => "missing signature header",
            Self::Malformed => "malformed signature header",
            Self::Mismatch => "signature mismatch",
        })
    }
}

/// Checks `signature_header` against the HMAC-SHA256 of `body` under `secret`.
///
/// The comparison is constant-time.
pub fn check_signature(secret: Option<&str>, signature_header: Option<&str>, body: &[u8]) -> SignatureCheck {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return SignatureCheck::MissingSecret;
    };
    let Some(header) = signature_header else {
        return SignatureCheck::MissingHeader;
    };
    let Some(expected) = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
    else {
        return SignatureCheck::Malformed;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return SignatureCheck::Mismatch;
    };
    mac.update(body);
    match mac.verify_slice(&expected) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Mismatch,
    }
}

/// Applies a [`VerificationPolicy`] to webhook envelopes.
#[derive(Clone)]
pub struct SignatureVerifier {
    policy: VerificationPolicy,
    secrets: Arc<dyn SecretProvider>,
}

impl SignatureVerifier {
    /// Creates a verifier reading the secret from `secrets` on every delivery.
    pub fn new(policy: VerificationPolicy, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { policy, secrets }
    }

    /// The configured policy.
    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    /// Verifies `envelope`. Only returns an error under
    /// [`VerificationPolicy::Enforce`].
    pub async fn verify(&self, envelope: &RawEnvelope) -> Result<(), ListenerError> {
        let secret = self.secrets.get_webhook_secret().await;
        let check = check_signature(
            secret.as_deref(),
            envelope.header(SIGNATURE_HEADER),
            envelope.body.as_bytes(),
        );

        match (check, self.policy) {
            (SignatureCheck::Valid, _) => {
                debug!("Webhook signature verified");
                Ok(())
            }
            (failure, VerificationPolicy::Enforce) => {
                warn!(reason = %failure, policy = %self.policy, "Rejecting webhook");
                Err(ListenerError::Unauthorized(failure))
            }
            (failure, VerificationPolicy::WarnOnly) => {
                warn!(
                    reason = %failure,
                    policy = %self.policy,
                    "Webhook signature not verified; processing anyway"
                );
                Ok(())
            }
        }
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
