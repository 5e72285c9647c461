//! Product parsing.

use crate::catalog::{Marketplace, ParsedProduct, SourceError};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::request_deadline;
use crate::product_cache::ProductId;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, Request, State};
use http::Uri;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Query for product parsing.
#[derive(Debug, Deserialize)]
pub struct ParseQuery {
    pub url: Option<String>,
}

/// Parsed product plus the id a try-on refers to it by.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    #[serde(flatten)]
    pub product: ParsedProduct,
    pub product_id: ProductId,
}

/// GET /api/product/parse?url=... - Parse a marketplace product page.
///
/// The caller limiter has already run as middleware. Scraping the same URL
/// repeatedly is limited separately, and the scrape itself waits for a gate
/// slot under the request deadline.
pub async fn parse_product(
    State(state): State<AppState>,
    Query(query): Query<ParseQuery>,
    request: Request,
) -> ApiResult<Json<ParseResponse>> {
    let raw = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing url query param".to_string()))?;

    let uri = parse_target(raw)?;
    let marketplace = Marketplace::from_uri(&uri).ok_or(SourceError::Unsupported)?;

    let caller = state.rate_limit.caller_identity(&request);
    state.rate_limit.check_repeat(&caller, raw)?;

    let (cancel, _deadline) = request_deadline(state.request_timeout());
    let permit = state.gate.acquire(&cancel).await?;
    let product = state.catalog.fetch(&uri, &cancel).await?;
    drop(permit);

    let product_id = state.products.remember(product.images.clone());
    info!(
        marketplace = marketplace.as_str(),
        product_id = %product_id,
        images = product.images.len(),
        "Parsed product"
    );

    Ok(Json(ParseResponse {
        product,
        product_id,
    }))
}

/// Parse an absolute target URL. Fragments are dropped.
fn parse_target(raw: &str) -> ApiResult<Uri> {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    let invalid = || ApiError::BadRequest("Invalid url query param".to_string());

    let uri: Uri = without_fragment.parse().map_err(|_| invalid())?;
    if uri.scheme().is_none() || uri.host().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let uri = parse_target("https://www.ozon.ru/product/123/#reviews").unwrap();
        assert_eq!(uri.host(), Some("www.ozon.ru"));
        assert_eq!(uri.path(), "/product/123/");

        assert!(parse_target("not a url").is_err());
        assert!(parse_target("/relative/path").is_err());
        assert!(parse_target("ozon.ru/product/1").is_err());
    }
}
