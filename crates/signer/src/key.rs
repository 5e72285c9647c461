//! HMAC secret material.

use crate::error::{SignerError, SignerResult};
use rand::RngCore;
use std::fmt;
use std::path::Path;
use tracing::warn;
use vitrine_core::config::SecretConfig;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Secret key for URL signatures.
#[derive(Clone)]
pub struct SigningSecret {
    bytes: Vec<u8>,
}

impl SigningSecret {
    /// Generate a new random 32-byte secret.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Parse a hex-encoded secret of at least [`MIN_SECRET_LEN`] bytes.
    pub fn from_hex(s: &str) -> SignerResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SignerError::KeyParsing(format!("invalid hex: {e}")))?;
        if bytes.len() < MIN_SECRET_LEN {
            return Err(SignerError::KeyParsing(format!(
                "expected at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Read a hex-encoded secret from a file.
    pub fn from_file(path: &Path) -> SignerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_hex(&contents)
    }

    /// Load the secret described by `config`.
    pub fn from_config(config: &SecretConfig) -> SignerResult<Self> {
        match config {
            SecretConfig::File { path } => Self::from_file(path),
            SecretConfig::Env { var } => {
                let value = std::env::var(var).map_err(|_| {
                    SignerError::KeyParsing(format!("environment variable {var} not set"))
                })?;
                Self::from_hex(&value)
            }
            SecretConfig::Value { secret } => {
                warn!("Using inline URL signing secret from config; prefer env or file");
                Self::from_hex(secret)
            }
            SecretConfig::Generate => {
                warn!("Generated an ephemeral URL signing secret; links will not survive a restart");
                Ok(Self::generate())
            }
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret([REDACTED])")
    }
}
