//! Health endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use vitrine_storage::PreviewStats;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Preview store occupancy.
    pub previews: PreviewStats,
}

/// GET /v1/health - Health check.
///
/// This endpoint is intentionally unthrottled to support:
/// - Kubernetes liveness/readiness checks
/// - Load balancer health checks
///
/// Reading the manifest doubles as a check that the preview directory is
/// usable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let previews = state.previews.stats().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        previews,
    }))
}
