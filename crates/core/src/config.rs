//! Configuration types shared across crates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Per-request deadline in seconds. Work still running when it elapses
    /// is cancelled and the request fails with 504.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum accepted shopper image size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_max_upload_bytes() -> usize {
    crate::DEFAULT_MAX_UPLOAD_BYTES
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "server.request_timeout_secs cannot be 0".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "server.max_upload_bytes cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preview artifact store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Directory holding the artifacts and their manifest.
    #[serde(default = "default_preview_path")]
    pub path: PathBuf,
    /// Retention in seconds, measured from creation.
    #[serde(default = "default_preview_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum number of stored artifacts.
    #[serde(default = "default_preview_max_items")]
    pub max_items: usize,
    /// Maximum total size of stored artifacts in bytes.
    #[serde(default = "default_preview_max_bytes")]
    pub max_bytes: u64,
    /// Interval in seconds between background sweeps.
    #[serde(default = "default_preview_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_preview_path() -> PathBuf {
    PathBuf::from("./data/previews")
}

fn default_preview_ttl_secs() -> u64 {
    6 * 60 * 60
}

fn default_preview_max_items() -> usize {
    500
}

fn default_preview_max_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_preview_sweep_interval_secs() -> u64 {
    300
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            path: default_preview_path(),
            ttl_secs: default_preview_ttl_secs(),
            max_items: default_preview_max_items(),
            max_bytes: default_preview_max_bytes(),
            sweep_interval_secs: default_preview_sweep_interval_secs(),
        }
    }
}

impl PreviewConfig {
    /// Get the retention period as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate preview store configuration.
    /// Returns warnings for settings that are allowed but unlikely to be intended.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "preview.sweep_interval_secs cannot be 0. \
                 This would cause a panic when creating the sweep timer."
                    .to_string(),
            ));
        }

        if self.max_items == 0 {
            warnings.push(
                "preview.max_items=0 rejects every preview with storage_full".to_string(),
            );
        }

        if self.max_bytes == 0 {
            warnings.push(
                "preview.max_bytes=0 rejects every non-empty preview as too large".to_string(),
            );
        }

        if self.ttl_secs == 0 {
            warnings.push(
                "preview.ttl_secs=0 expires previews immediately; signed links will 404"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Signed preview URL configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Lifetime of issued URLs in seconds.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
    /// HMAC secret source.
    #[serde(default)]
    pub secret: SecretConfig,
}

fn default_url_ttl_secs() -> u64 {
    15 * 60
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            url_ttl_secs: default_url_ttl_secs(),
            secret: SecretConfig::default(),
        }
    }
}

impl SigningConfig {
    /// Get the URL lifetime as a Duration.
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

/// HMAC secret source configuration.
///
/// Configured secrets are hex encoded and must decode to at least 32 bytes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretConfig {
    /// Secret stored in a file.
    File {
        /// Path to the secret file.
        path: PathBuf,
    },
    /// Secret stored in an environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Secret provided directly as a value (NOT recommended for production).
    Value {
        /// The hex-encoded secret.
        secret: String,
    },
    /// Generate a random secret at startup. URLs issued before a restart
    /// stop verifying after it.
    #[default]
    Generate,
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Length in seconds of the per-caller window.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests allowed per caller per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Length in seconds of the per-caller, per-target-URL window.
    #[serde(default = "default_repeat_window_secs")]
    pub repeat_window_secs: u64,
    /// Requests allowed per caller for the same target URL per window.
    #[serde(default = "default_repeat_max_requests")]
    pub repeat_max_requests: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// If empty, forwarded headers are never trusted (only direct connection IP is used).
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of keys to track per limiter before rejecting new entries (default: 100000).
    /// Prevents memory exhaustion from attackers spraying unique IPs.
    /// When limit is reached, new keys are rejected with 429 until cleanup runs.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between cleanup sweeps of expired windows (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> u32 {
    60
}

fn default_repeat_window_secs() -> u64 {
    600
}

fn default_repeat_max_requests() -> u32 {
    5
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            repeat_window_secs: default_repeat_window_secs(),
            repeat_max_requests: default_repeat_max_requests(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration for dangerous settings.
    /// Returns warnings for configs that are insecure but allowed,
    /// and errors for configs that are unsafe and should be rejected.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        // Zero would make tokio::time::interval panic
        if self.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "rate_limit.cleanup_interval_secs cannot be 0. \
                 This would cause a panic when creating the cleanup timer. \
                 Use a value >= 1 second."
                    .to_string(),
            ));
        }

        if self.window_secs == 0 || self.repeat_window_secs == 0 {
            return Err(Error::Config(
                "rate_limit.window_secs and rate_limit.repeat_window_secs must be >= 1"
                    .to_string(),
            ));
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 This allows clients to spoof their IP address and bypass rate limits. \
                 Only use this setting in development or behind a trusted reverse proxy."
                    .to_string(),
            );
        }

        if self.max_requests == 0 || self.repeat_max_requests == 0 {
            warnings.push(
                "rate_limit max_requests=0 denies every request on that limiter".to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Outbound scrape admission configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Scrape jobs allowed to run at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Jobs allowed to wait for a slot; beyond this, requests fail fast.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_queue_depth() -> usize {
    32
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

impl ScrapeConfig {
    /// Validate scrape admission configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config(
                "scrape.max_concurrent must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parsed product cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductCacheConfig {
    /// Entry lifetime in seconds.
    #[serde(default = "default_product_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum number of cached products.
    #[serde(default = "default_product_max_entries")]
    pub max_entries: usize,
}

fn default_product_ttl_secs() -> u64 {
    30 * 60
}

fn default_product_max_entries() -> usize {
    1000
}

impl Default for ProductCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_product_ttl_secs(),
            max_entries: default_product_max_entries(),
        }
    }
}

impl ProductCacheConfig {
    /// Get the entry lifetime as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Preview artifact store configuration.
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Signed URL configuration.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Outbound scrape admission configuration.
    #[serde(default)]
    pub scrape: ScrapeConfig,
    /// Parsed product cache configuration.
    #[serde(default)]
    pub product_cache: ProductCacheConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `preview_dir`.
    ///
    /// **For testing only.** Uses a generated signing secret.
    pub fn for_testing(preview_dir: impl Into<PathBuf>) -> Self {
        Self {
            preview: PreviewConfig {
                path: preview_dir.into(),
                ..PreviewConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section, collecting warnings.
    /// Returns the first hard error encountered.
    pub fn validate(&self) -> Result<Vec<String>> {
        self.server.validate()?;
        self.scrape.validate()?;
        let mut warnings = self.preview.validate()?;
        warnings.extend(self.rate_limit.validate()?);
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults_metrics_enabled() {
        let config = ServerConfig::default();
        assert!(config.metrics_enabled);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.max_upload_bytes, 15 * 1024 * 1024);
    }

    #[test]
    fn test_preview_config_deserialize_partial() {
        let json = r#"{"max_items": 2}"#;
        let config: PreviewConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_items, 2);
        assert_eq!(config.ttl_secs, 21600);
        assert_eq!(config.max_bytes, 512 * 1024 * 1024);
    }

    #[test]
    fn test_preview_config_rejects_zero_sweep_interval() {
        let config = PreviewConfig {
            sweep_interval_secs: 0,
            ..PreviewConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_preview_config_warns_on_zero_budget() {
        let config = PreviewConfig {
            max_items: 0,
            ..PreviewConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_secret_config_defaults_to_generate() {
        let config: SigningConfig = serde_json::from_str("{}").unwrap();
        assert!(matches!(config.secret, SecretConfig::Generate));
        assert_eq!(config.url_ttl_secs, 900);
    }

    #[test]
    fn test_secret_config_tagged_variants() {
        let json = r#"{"type":"env","var":"VITRINE_URL_SECRET"}"#;
        let config: SecretConfig = serde_json::from_str(json).unwrap();
        match config {
            SecretConfig::Env { var } => assert_eq!(var, "VITRINE_URL_SECRET"),
            other => panic!("expected env secret, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_validate_rejects_zero_cleanup_interval() {
        let config = RateLimitConfig {
            cleanup_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_validate_disabled_skips_checks() {
        let config = RateLimitConfig {
            enabled: false,
            cleanup_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_rate_limit_validate_warns_on_wildcard_proxy() {
        let config = RateLimitConfig {
            trusted_proxies: vec!["*".to_string()],
            ..RateLimitConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.contains("trusted_proxies")));
    }

    #[test]
    fn test_app_config_validate_defaults() {
        let config = AppConfig::for_testing("/tmp/previews");
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_app_config_validate_reports_section_error() {
        let mut config = AppConfig::for_testing("/tmp/previews");
        config.server.request_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("request_timeout_secs")));
        assert_eq!(
            err.to_string(),
            "invalid configuration: server.request_timeout_secs cannot be 0"
        );
    }

    #[test]
    fn test_scrape_config_rejects_zero_concurrency() {
        let config = ScrapeConfig {
            max_concurrent: 0,
            ..ScrapeConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
