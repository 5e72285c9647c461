//! Product sources.
//!
//! Only a fixed set of marketplaces is accepted, and only over https. The
//! bundled [`MockCatalog`] serves canned products; a real scraper plugs in
//! behind [`ProductSource`].

use async_trait::async_trait;
use http::Uri;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Supported marketplaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marketplace {
    Wildberries,
    Ozon,
    Lamoda,
}

impl Marketplace {
    pub const ALL: [Marketplace; 3] = [Self::Wildberries, Self::Ozon, Self::Lamoda];

    /// Registrable domain of the marketplace.
    pub fn domain(self) -> &'static str {
        match self {
            Self::Wildberries => "wildberries.ru",
            Self::Ozon => "ozon.ru",
            Self::Lamoda => "lamoda.ru",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wildberries => "wildberries",
            Self::Ozon => "ozon",
            Self::Lamoda => "lamoda",
        }
    }

    /// Marketplace whose domain equals `host` or is a parent of it.
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| {
            let domain = m.domain();
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Marketplace for a product URL, if it is https on a supported host.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        if uri.scheme_str() != Some("https") {
            return None;
        }
        Self::from_host(uri.host()?)
    }
}

/// A similar product shown next to the parsed one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimilarProduct {
    pub title: String,
    pub price: Option<u64>,
    pub image: Option<String>,
}

/// Normalized product data.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProduct {
    pub title: String,
    pub article: Option<String>,
    /// Price in whole rubles.
    pub price: Option<u64>,
    pub original_price: Option<u64>,
    /// Discount in percent.
    pub discount: Option<u8>,
    pub images: Vec<String>,
    pub similar: Vec<SimilarProduct>,
    pub sizes: Vec<String>,
    pub recommended_size: Option<String>,
    pub recommendation_confidence: Option<f64>,
    pub fit_notes: Vec<String>,
    pub marketplace: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported product source")]
    Unsupported,

    #[error("product fetch aborted")]
    Aborted,

    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Fetches and normalizes product pages.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(&self, url: &Uri, cancel: &CancellationToken)
    -> Result<ParsedProduct, SourceError>;
}

/// Canned products keyed by marketplace, served after a short delay.
#[derive(Clone, Debug)]
pub struct MockCatalog {
    delay: Duration,
}

impl MockCatalog {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl ProductSource for MockCatalog {
    async fn fetch(
        &self,
        url: &Uri,
        cancel: &CancellationToken,
    ) -> Result<ParsedProduct, SourceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Aborted),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let article = article_from_path(url.path());
        let product = match Marketplace::from_host(url.host().unwrap_or_default()) {
            Some(Marketplace::Wildberries) => canned(
                "Платье миди из вискозы",
                article,
                Some((3_490, 5_990)),
                &["XS", "S", "M", "L"],
                &[
                    "https://images.unsplash.com/photo-1515372039744-b8f02a3ae446?w=1200&q=80",
                    "https://images.unsplash.com/photo-1496747611176-843222e1e57c?w=1200&q=80",
                ],
                Marketplace::Wildberries,
            ),
            Some(Marketplace::Ozon) => canned(
                "Худи оверсайз с капюшоном",
                article,
                Some((2_790, 3_990)),
                &["S", "M", "L", "XL"],
                &["https://images.unsplash.com/photo-1556821840-3a63f95609a7?w=1200&q=80"],
                Marketplace::Ozon,
            ),
            Some(Marketplace::Lamoda) => canned(
                "Джинсы прямого кроя",
                article,
                Some((4_990, 4_990)),
                &["XS", "S", "M", "L", "XL", "XXL"],
                &[
                    "https://images.unsplash.com/photo-1542272604-787c3835535d?w=1200&q=80",
                    "https://images.unsplash.com/photo-1475178626620-a4d074967452?w=1200&q=80",
                ],
                Marketplace::Lamoda,
            ),
            None => return Err(SourceError::Unsupported),
        };
        Ok(product)
    }
}

/// First all-digit path segment, which marketplaces use as the article.
fn article_from_path(path: &str) -> Option<String> {
    path.split('/')
        .find(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

fn canned(
    title: &str,
    article: Option<String>,
    prices: Option<(u64, u64)>,
    sizes: &[&str],
    images: &[&str],
    marketplace: Marketplace,
) -> ParsedProduct {
    let (price, original_price) = match prices {
        Some((price, original)) => (Some(price), Some(original)),
        None => (None, None),
    };
    let discount = match (price, original_price) {
        (Some(p), Some(o)) if o > p => Some((100 - p * 100 / o) as u8),
        _ => None,
    };
    let images: Vec<String> = images.iter().map(|s| s.to_string()).collect();

    ParsedProduct {
        title: title.to_string(),
        article,
        price,
        original_price,
        discount,
        similar: vec![SimilarProduct {
            title: format!("{title} (другой цвет)"),
            price,
            image: images.first().cloned(),
        }],
        images,
        sizes: sizes.iter().map(|s| s.to_string()).collect(),
        recommended_size: Some("M".to_string()),
        recommendation_confidence: Some(0.86),
        fit_notes: vec!["Посадка соответствует размерной сетке".to_string()],
        marketplace: Some(marketplace.as_str().to_string()),
    }
}
