//! Server test utilities.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vitrine_core::config::AppConfig;
use vitrine_server::catalog::MockCatalog;
use vitrine_server::renderer::MockRenderer;
use vitrine_server::{AppState, create_router};
use vitrine_signer::{SigningSecret, UrlSigner};
use vitrine_storage::PreviewStore;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with a temporary preview directory.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, MockCatalog::new(Duration::ZERO)).await
    }

    /// Create a test server whose product source takes `delay` per fetch.
    pub async fn with_catalog_delay<F>(delay: Duration, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, MockCatalog::new(delay)).await
    }

    async fn build<F>(modifier: F, catalog: MockCatalog) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing(temp_dir.path().join("previews"));
        modifier(&mut config);

        vitrine_server::metrics::register_metrics();

        let previews = PreviewStore::open(&config.preview)
            .await
            .expect("Failed to open preview store");
        let signer = UrlSigner::new(&SigningSecret::generate(), config.signing.url_ttl())
            .expect("Failed to create signer");

        let state = AppState::new(config, previews, signer)
            .with_collaborators(Arc::new(catalog), Arc::new(MockRenderer::instant()));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }
}
