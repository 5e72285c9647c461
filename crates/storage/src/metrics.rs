//! Prometheus collectors for the preview store.
//!
//! The server registers these with its registry; see `collectors`.

use prometheus::core::Collector;
use prometheus::{IntCounter, IntCounterVec, Opts};
use std::sync::LazyLock;

pub static PREVIEWS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vitrine_previews_stored_total",
        "Total number of preview artifacts written",
    )
    .expect("metric creation failed")
});

pub static PREVIEW_BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vitrine_preview_bytes_stored_total",
        "Total bytes of preview artifacts written",
    )
    .expect("metric creation failed")
});

pub static PREVIEWS_REMOVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vitrine_previews_removed_total",
            "Preview artifacts removed from the store by reason",
        ),
        &["reason"], // evicted, expired, missing, orphan
    )
    .expect("metric creation failed")
});

pub static PREVIEW_BYTES_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vitrine_preview_bytes_reclaimed_total",
        "Bytes freed by eviction, expiry and orphan removal",
    )
    .expect("metric creation failed")
});

pub static PREVIEW_PUT_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vitrine_preview_put_rejections_total",
            "Preview writes refused by admission control or cancellation",
        ),
        &["reason"], // capacity_exceeded, temporarily_full, aborted
    )
    .expect("metric creation failed")
});

/// All storage collectors, for registration with a registry.
pub fn collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(PREVIEWS_STORED.clone()),
        Box::new(PREVIEW_BYTES_STORED.clone()),
        Box::new(PREVIEWS_REMOVED.clone()),
        Box::new(PREVIEW_BYTES_RECLAIMED.clone()),
        Box::new(PREVIEW_PUT_REJECTIONS.clone()),
    ]
}

pub(crate) fn record_removed(reason: &str, count: usize, bytes: u64) {
    if count > 0 {
        PREVIEWS_REMOVED
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }
    if bytes > 0 {
        PREVIEW_BYTES_RECLAIMED.inc_by(bytes);
    }
}

pub(crate) fn record_rejection(reason: &str) {
    PREVIEW_PUT_REJECTIONS.with_label_values(&[reason]).inc();
}
