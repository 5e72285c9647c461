//! Try-on rendering.
//!
//! The bundled [`MockRenderer`] walks through the upload, segmentation and
//! rendering stages with cancellable delays and returns the shopper's image
//! as the render. Its 3D fitting is a canned result. A real provider plugs
//! in behind [`TryOnRenderer`].

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Sizes a recommendation can name.
pub const AVAILABLE_SIZES: [&str; 7] = ["XXS", "XS", "S", "M", "L", "XL", "XXL"];

const DEFAULT_SIZE: &str = "M";

const FITTING_CONFIDENCE: f64 = 0.92;
const FITTING_IMAGE: &str =
    "https://images.unsplash.com/photo-1521572163474-6864f9cf17ab?w=800&auto=format&fit=crop&q=80";

/// Normalize a size hint to one of [`AVAILABLE_SIZES`].
pub fn normalize_size(value: &str) -> Option<&'static str> {
    let upper = value.trim().to_ascii_uppercase();
    AVAILABLE_SIZES.into_iter().find(|size| *size == upper)
}

/// Input to a render.
#[derive(Clone, Debug)]
pub struct TryOnRequest {
    /// The shopper's photo.
    pub image: Bytes,
    pub content_type: String,
    /// Image of the garment to put on.
    pub garment_image: String,
    pub suggested_size: Option<String>,
}

/// Output of a render.
#[derive(Clone, Debug)]
pub struct TryOnRender {
    pub image: Bytes,
    pub recommended_size: String,
    pub confidence: f64,
    pub recommendation: String,
}

/// Output of a 3D fitting.
#[derive(Clone, Debug, PartialEq)]
pub struct FittingRender {
    pub recommended_size: String,
    pub confidence: f64,
    /// Link to the rendered fitting image.
    pub rendered_image: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render aborted")]
    Aborted,

    #[error("render failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TryOnRenderer: Send + Sync {
    async fn render(
        &self,
        request: TryOnRequest,
        cancel: &CancellationToken,
    ) -> Result<TryOnRender, RenderError>;

    async fn render_3d(&self, cancel: &CancellationToken) -> Result<FittingRender, RenderError>;
}

/// Simulated renderer.
#[derive(Clone, Debug)]
pub struct MockRenderer {
    upload: Duration,
    segmentation: Duration,
    rendering: Duration,
}

impl MockRenderer {
    /// A renderer with no stage delays.
    pub fn instant() -> Self {
        Self {
            upload: Duration::ZERO,
            segmentation: Duration::ZERO,
            rendering: Duration::ZERO,
        }
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self {
            upload: Duration::from_millis(350),
            segmentation: Duration::from_millis(550),
            rendering: Duration::from_millis(700),
        }
    }
}

#[async_trait]
impl TryOnRenderer for MockRenderer {
    async fn render(
        &self,
        request: TryOnRequest,
        cancel: &CancellationToken,
    ) -> Result<TryOnRender, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Aborted);
        }
        for (stage, delay) in [
            ("upload", self.upload),
            ("segmentation", self.segmentation),
            ("rendering", self.rendering),
        ] {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RenderError::Aborted),
                _ = tokio::time::sleep(delay) => tracing::trace!(stage, "try-on stage done"),
            }
        }

        let suggested = request.suggested_size.as_deref().and_then(normalize_size);
        let recommended_size = suggested.unwrap_or(DEFAULT_SIZE).to_string();
        let confidence = confidence(request.image.len(), suggested.is_some());

        Ok(TryOnRender {
            recommendation: format!(
                "Рекомендуем размер {recommended_size}: примерка учла пропорции \
                 силуэта и плотность ткани."
            ),
            image: request.image,
            recommended_size,
            confidence,
        })
    }

    async fn render_3d(&self, cancel: &CancellationToken) -> Result<FittingRender, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Aborted);
        }
        Ok(FittingRender {
            recommended_size: DEFAULT_SIZE.to_string(),
            confidence: FITTING_CONFIDENCE,
            rendered_image: FITTING_IMAGE.to_string(),
        })
    }
}

/// Confidence grows with image size (up to 8 MiB) and with a size hint.
fn confidence(image_len: usize, size_suggested: bool) -> f64 {
    let impact = (image_len as f64 / (8.0 * 1024.0 * 1024.0)).min(1.0);
    let boost = if size_suggested { 0.03 } else { 0.0 };
    let raw = ((0.82 + impact * 0.12 + boost) * 100.0).round() / 100.0;
    raw.min(0.97)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(len: usize, size: Option<&str>) -> TryOnRequest {
        TryOnRequest {
            image: Bytes::from(vec![7u8; len]),
            content_type: "image/png".to_string(),
            garment_image: "https://cdn.example/1.jpg".to_string(),
            suggested_size: size.map(str::to_string),
        }
    }

    #[test]
    fn test_normalize_size() {
        assert_eq!(normalize_size(" xl "), Some("XL"));
        assert_eq!(normalize_size("m"), Some("M"));
        assert_eq!(normalize_size("XXXL"), None);
        assert_eq!(normalize_size(""), None);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(confidence(0, false), 0.82);
        assert_eq!(confidence(0, true), 0.85);
        assert_eq!(confidence(4 * 1024 * 1024, false), 0.88);
        // Capped
        assert_eq!(confidence(64 * 1024 * 1024, true), 0.97);
    }

    #[tokio::test]
    async fn test_render_recommends_normalized_size() {
        let render = MockRenderer::instant()
            .render(request(16, Some("l")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(render.recommended_size, "L");
        assert_eq!(render.confidence, 0.85);
        assert_eq!(render.image.len(), 16);
        assert_eq!(
            render.recommendation,
            "Рекомендуем размер L: примерка учла пропорции силуэта и плотность ткани."
        );
    }

    #[tokio::test]
    async fn test_render_defaults_to_m() {
        let render = MockRenderer::instant()
            .render(request(16, Some("huge")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(render.recommended_size, "M");
        assert_eq!(render.confidence, 0.82);
    }

    #[tokio::test]
    async fn test_render_3d_is_canned() {
        let fitting = MockRenderer::default()
            .render_3d(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fitting.recommended_size, "M");
        assert_eq!(fitting.confidence, 0.92);
        assert!(fitting.rendered_image.starts_with("https://"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            MockRenderer::instant().render_3d(&cancel).await,
            Err(RenderError::Aborted)
        ));
    }

    #[tokio::test]
    async fn test_render_aborts_when_cancelled() {
        let cancel = CancellationToken::new();
        let renderer = MockRenderer::default();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { renderer.render(request(16, None), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(matches!(
            handle.await.unwrap(),
            Err(RenderError::Aborted)
        ));
    }
}
