//! HTTP API server for vitrine.
//!
//! This crate provides the HTTP surface:
//! - Marketplace product parsing behind a concurrency gate
//! - 2D try-on rendering into the preview store
//! - Signed, expiring preview downloads
//! - Per-caller and per-target rate limiting
//! - Health and Prometheus endpoints

pub mod catalog;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod metrics;
pub mod product_cache;
pub mod ratelimit;
pub mod renderer;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use state::AppState;
