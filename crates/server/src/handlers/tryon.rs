//! Virtual try-on.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::request_deadline;
use crate::metrics::TRYON_DURATION;
use crate::renderer::TryOnRequest;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Query for a 2D try-on. The shopper's photo is the raw request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnQuery {
    pub product_id: Option<String>,
    pub image_index: Option<usize>,
    pub suggested_size: Option<String>,
}

/// Completed try-on.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnResponse {
    /// Signed, expiring link to the rendered preview.
    pub image_url: String,
    /// Link expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
    pub recommended_size: String,
    pub confidence: f64,
    pub recommendation: String,
    pub status: &'static str,
    pub status_message: &'static str,
}

/// Completed 3D fitting.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FittingResponse {
    pub recommended_size: String,
    pub confidence: f64,
    pub rendered_image: String,
}

/// POST /api/tryon/2d?productId=...&imageIndex=...&suggestedSize=...
///
/// Renders the shopper's photo with the product's garment image, stores
/// the result as a preview, and returns a signed link to it.
pub async fn tryon_2d(
    State(state): State<AppState>,
    Query(query): Query<TryOnQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<TryOnResponse>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.starts_with("image/"))
        .ok_or_else(|| ApiError::BadRequest("only image uploads are supported".to_string()))?
        .to_string();

    let limit = state.config.server.max_upload_bytes;
    let image = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit }
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if image.is_empty() {
        return Err(ApiError::BadRequest("image upload is empty".to_string()));
    }

    let product_id = query
        .product_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing productId query param".to_string()))?;
    let garment_image = state
        .products
        .resolve(product_id, query.image_index.unwrap_or(0))
        .ok_or_else(|| ApiError::NotFound("product not found or expired".to_string()))?;

    let _timer = TRYON_DURATION.start_timer();
    let (cancel, _deadline) = request_deadline(state.request_timeout());

    let upload_bytes = image.len();
    let render = state
        .renderer
        .render(
            TryOnRequest {
                image,
                content_type,
                garment_image,
                suggested_size: query.suggested_size,
            },
            &cancel,
        )
        .await?;

    let artifact_id = state.previews.put(render.image, &cancel).await?;
    let signed = state.signer.issue(&artifact_id);

    info!(
        artifact_id = %artifact_id,
        upload_bytes = upload_bytes,
        recommended_size = %render.recommended_size,
        "Try-on completed"
    );

    Ok(Json(TryOnResponse {
        image_url: signed.path(),
        expires_at: signed.expires_at_ms,
        recommended_size: render.recommended_size,
        confidence: render.confidence,
        recommendation: render.recommendation,
        status: "completed",
        status_message: "Примерка успешно завершена.",
    }))
}

/// POST /api/tryon/3d
pub async fn tryon_3d(State(state): State<AppState>) -> ApiResult<Json<FittingResponse>> {
    let (cancel, _deadline) = request_deadline(state.request_timeout());
    let fitting = state.renderer.render_3d(&cancel).await?;
    debug!(recommended_size = %fitting.recommended_size, "3D fitting completed");

    Ok(Json(FittingResponse {
        recommended_size: fitting.recommended_size,
        confidence: fitting.confidence,
        rendered_image: fitting.rendered_image,
    }))
}
