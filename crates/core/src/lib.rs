//! Core domain types and shared configuration for vitrine.
//!
//! This crate defines the data model used across the other crates:
//! - Artifact identifiers for stored try-on previews
//! - Application configuration and its validation rules
//! - Millisecond wall-clock timestamps

pub mod artifact;
pub mod clock;
pub mod config;
pub mod error;

pub use artifact::ArtifactId;
pub use error::{Error, Result};

/// Default upper bound for an uploaded shopper image: 15 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

/// File extension used for stored preview artifacts.
pub const ARTIFACT_EXTENSION: &str = "img";
