//! Signer error types.

use thiserror::Error;

/// Signing operation errors.
///
/// The verification variants exist for logging. Callers facing the network
/// should not tell them apart.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("malformed token")]
    MalformedToken,

    #[error("signed url expired")]
    Expired,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for signing operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
