//! Preview artifact storage for vitrine.
//!
//! This crate provides:
//! - Crash-safe file writes (temp sibling, fsync, rename)
//! - A JSON manifest whose read-modify-write cycles run on a single executor task
//! - A deterministic, age-based eviction policy with item and byte budgets
//! - The preview store tying them together, plus its background sweep

pub mod atomic;
pub mod error;
pub mod eviction;
pub mod manifest;
pub mod metrics;
pub mod preview;

pub use error::{StorageError, StorageResult};
pub use eviction::{EvictionPolicy, Limits, Plan, Verdict};
pub use manifest::{Manifest, ManifestEntry, ManifestFile, ManifestStore};
pub use preview::{PreviewStats, PreviewStore, SweepStats, spawn_sweep_task};
