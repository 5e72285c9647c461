//! Prometheus metrics for the vitrine server.
//!
//! Exposes admission-control counters (rate limiting, scrape gate), signed
//! link failures, render latency, and the preview store's own collectors.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no caller identities, URLs or artifact ids, but they do
//! expose aggregate traffic and storage usage.
//!
//! **Deployment Requirement**: The `/metrics` endpoint MUST be network-restricted
//! to authorized Prometheus scraper IPs only. This should be enforced at the
//! infrastructure level (firewall, load balancer, or reverse proxy rules).

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Rate limiting
pub static RATE_LIMIT_DENIALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vitrine_rate_limit_denials_total",
            "Requests denied by a rate limiter",
        ),
        &["limiter", "reason"], // caller|repeat_url, rate_limited|at_capacity
    )
    .expect("metric creation failed")
});

// Scrape admission gate
pub static GATE_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vitrine_scrape_jobs_active",
        "Number of scrape jobs currently holding a gate slot",
    )
    .expect("metric creation failed")
});

pub static GATE_QUEUED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "vitrine_scrape_jobs_queued",
        "Number of scrape jobs waiting for a gate slot",
    )
    .expect("metric creation failed")
});

pub static GATE_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vitrine_scrape_gate_rejections_total",
            "Scrape jobs refused by the admission gate",
        ),
        &["reason"], // queue_full, aborted
    )
    .expect("metric creation failed")
});

// Signed links
pub static SIGNATURE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vitrine_signature_failures_total",
            "Preview link verifications that failed",
        ),
        &["reason"], // missing, malformed, expired, mismatch
    )
    .expect("metric creation failed")
});

pub static PREVIEWS_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vitrine_previews_served_total",
        "Preview artifacts served through signed links",
    )
    .expect("metric creation failed")
});

// Try-on
pub static TRYON_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vitrine_tryon_duration_seconds",
            "Time spent rendering and storing a try-on preview",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
/// This allows safe use in integration tests or when embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(RATE_LIMIT_DENIALS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GATE_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GATE_QUEUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GATE_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNATURE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PREVIEWS_SERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TRYON_DURATION.clone()))
            .expect("metric registration failed");

        // Preview store metrics
        for collector in vitrine_storage::metrics::collectors() {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record signed link failures by reason.
pub fn record_signature_failure(reason: &str) {
    SIGNATURE_FAILURES.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // This would panic if any metric creation failed
        register_metrics();
        register_metrics();
    }
}
