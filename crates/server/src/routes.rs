//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::caller_rate_limit_middleware;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/product/parse", get(handlers::parse_product))
        .route(
            "/api/tryon/2d",
            post(handlers::tryon_2d).layer(DefaultBodyLimit::max(
                state.config.server.max_upload_bytes,
            )),
        )
        .route("/api/tryon/3d", post(handlers::tryon_3d))
        // Per-caller rate limiting. Preview downloads check the same limiter
        // themselves, after the link signature.
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            caller_rate_limit_middleware,
        ));

    let public_routes = Router::new()
        // Health check (unthrottled for load balancers and k8s liveness checks)
        .route("/v1/health", get(handlers::health_check))
        .route("/preview/{artifact_id}", get(handlers::get_preview));

    let mut router = Router::new().merge(api_routes).merge(public_routes);

    // Conditionally add metrics endpoint based on config.
    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
