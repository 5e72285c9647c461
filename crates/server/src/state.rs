//! Application state shared across handlers.

use crate::catalog::{MockCatalog, ProductSource};
use crate::gate::ConcurrencyGate;
use crate::product_cache::ParsedProductCache;
use crate::ratelimit::RateLimitState;
use crate::renderer::{MockRenderer, TryOnRenderer};
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::config::AppConfig;
use vitrine_signer::UrlSigner;
use vitrine_storage::PreviewStore;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Preview artifact store.
    pub previews: PreviewStore,
    /// Preview link signer.
    pub signer: Arc<UrlSigner>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
    /// Scrape admission gate.
    pub gate: ConcurrencyGate,
    /// Parsed products awaiting a try-on.
    pub products: Arc<ParsedProductCache>,
    pub catalog: Arc<dyn ProductSource>,
    pub renderer: Arc<dyn TryOnRenderer>,
}

impl AppState {
    /// Create application state with the bundled product source and renderer.
    ///
    /// The configuration is expected to have passed `AppConfig::validate`.
    pub fn new(config: AppConfig, previews: PreviewStore, signer: UrlSigner) -> Self {
        let rate_limit = RateLimitState::new(&config.rate_limit);
        let gate = ConcurrencyGate::from_config(&config.scrape);
        let products = ParsedProductCache::from_config(&config.product_cache);

        Self {
            config: Arc::new(config),
            previews,
            signer: Arc::new(signer),
            rate_limit,
            gate,
            products: Arc::new(products),
            catalog: Arc::new(MockCatalog::default()),
            renderer: Arc::new(MockRenderer::default()),
        }
    }

    /// Replace the product source and renderer.
    pub fn with_collaborators(
        mut self,
        catalog: Arc<dyn ProductSource>,
        renderer: Arc<dyn TryOnRenderer>,
    ) -> Self {
        self.catalog = catalog;
        self.renderer = renderer;
        self
    }

    /// Get the rate limit cleanup interval, if rate limiting is enabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if self.rate_limit.is_enabled() {
            let interval_secs = self.config.rate_limit.cleanup_interval_secs;
            // Guard against zero interval which would cause tokio::time::interval to panic
            if interval_secs == 0 {
                tracing::warn!(
                    "rate_limit.cleanup_interval_secs is 0, using default of 60 seconds"
                );
                Some(Duration::from_secs(60))
            } else {
                Some(Duration::from_secs(interval_secs))
            }
        } else {
            None
        }
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        self.config.server.request_timeout()
    }
}
