//! Shared handler helpers.

use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation scope for one request.
///
/// The token fires when `timeout` elapses, and when the returned guard is
/// dropped: on handler return, or when axum drops the handler future
/// because the client went away. Keep the guard alive for the whole
/// handler body.
pub fn request_deadline(timeout: Duration) -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(timeout_secs = timeout.as_secs(), "request deadline elapsed");
                timer.cancel();
            }
        }
    });
    let guard = token.clone().drop_guard();
    (token, guard)
}
