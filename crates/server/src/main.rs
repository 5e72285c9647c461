//! Vitrine server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitrine_core::config::AppConfig;
use vitrine_server::ratelimit::spawn_cleanup_task;
use vitrine_server::{AppState, create_router};
use vitrine_signer::UrlSigner;
use vitrine_storage::{PreviewStore, spawn_sweep_task};

/// Vitrine - try-on previews and product parsing behind admission control
#[derive(Parser, Debug)]
#[command(name = "vitrined")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "VITRINE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vitrine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    for warning in config.validate()? {
        tracing::warn!("Configuration warning: {}", warning);
    }

    vitrine_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let previews = PreviewStore::open(&config.preview)
        .await
        .with_context(|| {
            format!(
                "failed to open preview store at {}",
                config.preview.path.display()
            )
        })?;
    let stats = previews
        .stats()
        .await
        .context("preview manifest is unreadable")?;
    tracing::info!(
        path = %config.preview.path.display(),
        items = stats.items,
        bytes = stats.bytes,
        "Preview store opened"
    );

    let signer =
        UrlSigner::from_config(&config.signing).context("failed to load signing secret")?;
    tracing::info!(
        url_ttl_secs = config.signing.url_ttl_secs,
        "Preview link signer initialized"
    );

    let state = AppState::new(config.clone(), previews.clone(), signer);
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let sweep_interval = config.preview.sweep_interval();
    tasks.push(spawn_sweep_task(previews, sweep_interval, shutdown.clone()));
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Preview sweep task spawned"
    );

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        tasks.push(spawn_cleanup_task(
            state.rate_limit.clone(),
            cleanup_interval,
            shutdown.clone(),
        ));
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // Start server with ConnectInfo for client IP extraction
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Load configuration from the optional TOML file, then `VITRINE_*`
/// environment variables (`__` separates sections).
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(
            "No config file found at {}, using defaults and environment",
            path
        );
    }

    figment
        .merge(Env::prefixed("VITRINE_").split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Resolve on Ctrl-C, or when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_without_file_uses_defaults() {
        let config = load_config("/nonexistent/vitrine.toml").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:4000");
        assert_eq!(config.preview.max_items, 500);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:8080"

[preview]
path = "/var/lib/vitrine/previews"
max_items = 20

[signing.secret]
type = "env"
var = "VITRINE_URL_SECRET"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.preview.max_items, 20);
        assert_eq!(config.preview.ttl_secs, 21600);
        assert!(matches!(
            config.signing.secret,
            vitrine_core::config::SecretConfig::Env { .. }
        ));
    }
}
