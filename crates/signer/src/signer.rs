//! Preview URL signing and verification.
//!
//! A token is `hex(HMAC-SHA256(secret, "<artifactId>:<expiresAt>"))` where
//! `expiresAt` is in milliseconds since the Unix epoch. A URL is valid while
//! the current time is strictly before `expiresAt`.

use crate::error::{SignerError, SignerResult};
use crate::key::SigningSecret;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use vitrine_core::ArtifactId;
use vitrine_core::clock::now_ms;
use vitrine_core::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded token.
pub const TOKEN_HEX_LEN: usize = 64;

/// An issued preview URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    pub artifact_id: ArtifactId,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at_ms: i64,
    /// Lowercase hex signature.
    pub token: String,
}

impl SignedUrl {
    /// Path and query under which the preview is served.
    pub fn path(&self) -> String {
        format!(
            "/preview/{}?token={}&expiresAt={}",
            self.artifact_id, self.token, self.expires_at_ms
        )
    }
}

/// Issues and verifies signed preview URLs.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl UrlSigner {
    /// Create a signer issuing URLs valid for `ttl`.
    pub fn new(secret: &SigningSecret, ttl: Duration) -> SignerResult<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| SignerError::KeyParsing(format!("invalid HMAC key: {e}")))?;
        Ok(Self { mac, ttl })
    }

    /// Create from configuration, loading the secret it names.
    pub fn from_config(config: &SigningConfig) -> SignerResult<Self> {
        let secret = SigningSecret::from_config(&config.secret)?;
        Self::new(&secret, config.url_ttl())
    }

    /// Lifetime of issued URLs.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a URL for `artifact_id`, valid for the configured lifetime.
    pub fn issue(&self, artifact_id: &ArtifactId) -> SignedUrl {
        self.issue_at(artifact_id, now_ms())
    }

    /// Issue a URL as if the current time were `now_ms`.
    pub fn issue_at(&self, artifact_id: &ArtifactId, now_ms: i64) -> SignedUrl {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now_ms.saturating_add(ttl_ms);
        SignedUrl {
            artifact_id: *artifact_id,
            expires_at_ms,
            token: hex::encode(self.signature(artifact_id, expires_at_ms)),
        }
    }

    /// Whether `token` is a valid, unexpired signature for the artifact.
    pub fn verify(&self, artifact_id: &ArtifactId, token: &str, expires_at_ms: i64) -> bool {
        self.check_at(artifact_id, token, expires_at_ms, now_ms())
            .is_ok()
    }

    /// Verify as if the current time were `now_ms`, reporting why a URL is
    /// rejected.
    pub fn check_at(
        &self,
        artifact_id: &ArtifactId,
        token: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> SignerResult<()> {
        if token.len() != TOKEN_HEX_LEN
            || !token
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(SignerError::MalformedToken);
        }
        let provided = hex::decode(token).map_err(|_| SignerError::MalformedToken)?;

        if now_ms >= expires_at_ms {
            return Err(SignerError::Expired);
        }

        let mut mac = self.mac.clone();
        mac.update(message(artifact_id, expires_at_ms).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| SignerError::SignatureMismatch)
    }

    /// Verify against the current time, reporting why a URL is rejected.
    pub fn check(
        &self,
        artifact_id: &ArtifactId,
        token: &str,
        expires_at_ms: i64,
    ) -> SignerResult<()> {
        self.check_at(artifact_id, token, expires_at_ms, now_ms())
    }

    fn signature(&self, artifact_id: &ArtifactId, expires_at_ms: i64) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message(artifact_id, expires_at_ms).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn message(artifact_id: &ArtifactId, expires_at_ms: i64) -> String {
    format!("{artifact_id}:{expires_at_ms}")
}
