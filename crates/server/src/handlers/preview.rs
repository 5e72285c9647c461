//! Signed preview downloads.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::request_deadline;
use crate::metrics::{PREVIEWS_SERVED, record_signature_failure};
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;
use vitrine_core::ArtifactId;
use vitrine_core::clock::now_ms;
use vitrine_signer::SignerError;

/// Every signature failure looks the same from outside.
const LINK_INVALID: &str = "link expired or invalid";

/// Signed link parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub token: Option<String>,
    /// Kept as text so a garbled value is a 403 like any other bad link.
    pub expires_at: Option<String>,
}

/// GET /preview/{artifact_id}?token=...&expiresAt=...
///
/// Checks, in order: id syntax (400), link signature and expiry (403),
/// the caller limiter (429), then reads the artifact (404 if gone).
pub async fn get_preview(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
    Query(query): Query<PreviewQuery>,
    request: Request,
) -> ApiResult<Response> {
    let artifact_id = ArtifactId::parse(&artifact_id)?;

    let (Some(token), Some(expires_at)) = (query.token.as_deref(), query.expires_at.as_deref())
    else {
        record_signature_failure("missing");
        return Err(ApiError::Forbidden(LINK_INVALID.to_string()));
    };
    let Ok(expires_at_ms) = expires_at.parse::<i64>() else {
        record_signature_failure("malformed");
        return Err(ApiError::Forbidden(LINK_INVALID.to_string()));
    };

    if let Err(e) = state.signer.check(&artifact_id, token, expires_at_ms) {
        let reason = match e {
            SignerError::MalformedToken => "malformed",
            SignerError::Expired => "expired",
            SignerError::SignatureMismatch => "mismatch",
            _ => "invalid",
        };
        record_signature_failure(reason);
        debug!(artifact_id = %artifact_id, reason = reason, "Rejected preview link");
        return Err(ApiError::Forbidden(LINK_INVALID.to_string()));
    }

    let caller = state.rate_limit.caller_identity(&request);
    state.rate_limit.check_caller(&caller)?;

    let (cancel, _deadline) = request_deadline(state.request_timeout());
    let bytes = state.previews.get(&artifact_id, &cancel).await?;
    PREVIEWS_SERVED.inc();

    let max_age = seconds_until(expires_at_ms, now_ms());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, sniff_content_type(&bytes).to_string()),
            (header::CACHE_CONTROL, format!("private, max-age={max_age}")),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Image type from magic bytes. Unknown content is served as JPEG.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Whole seconds from `now_ms` until `expires_at_ms`, rounded up.
fn seconds_until(expires_at_ms: i64, now_ms: i64) -> i64 {
    let remaining = expires_at_ms.saturating_sub(now_ms).max(0);
    remaining.saturating_add(999) / 1000
}
