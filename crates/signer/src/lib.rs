//! Signed, expiring preview URLs for vitrine.
//!
//! This crate provides:
//! - HMAC secret loading (file, environment, inline value, or generated)
//! - URL issuing with a fixed lifetime
//! - Constant-time verification

pub mod error;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use key::SigningSecret;
pub use signer::{SignedUrl, UrlSigner};
