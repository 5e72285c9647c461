//! Fixed-window rate limiting.
//!
//! Two limiters share one caller identity:
//! - `caller`: every request from a caller counts against one window
//! - `repeat_url`: requests from a caller for the same target URL
//!
//! A bucket is `{ count, reset_at }`. A missing or elapsed bucket starts a
//! fresh window; otherwise the count is incremented and the request is
//! allowed while it stays within the cap.
//!
//! # Memory Safety
//!
//! Each limiter tracks at most `max_entries` keys. New keys beyond that are
//! rejected with 429 until the background cleanup drops elapsed windows.
//!
//! # Security Note
//!
//! By default, X-Forwarded-For and X-Real-IP headers are NOT trusted to prevent
//! IP spoofing attacks. You must explicitly configure `trusted_proxies` to enable
//! header-based IP detection:
//!
//! - Empty list (default): Only direct connection IP is used (most secure)
//! - List of IPs/CIDRs: Headers trusted only when request comes from these IPs
//! - ["*"]: Trust headers from all sources (NOT recommended for production)

use crate::metrics::RATE_LIMIT_DENIALS;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use ipnet::IpNet;
use sha2::{Digest, Sha256};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use vitrine_core::config::RateLimitConfig;

/// Seconds suggested to callers rejected because a limiter is full.
const AT_CAPACITY_RETRY_AFTER_SECS: u64 = 60;

/// One fixed window.
#[derive(Clone, Copy, Debug)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// A keyed fixed-window counter.
pub struct FixedWindowLimiter {
    name: &'static str,
    buckets: DashMap<String, Bucket>,
    cap: u32,
    window: Duration,
    max_entries: usize,
    /// Whether the at-capacity warning has been logged (prevents log spam during DoS).
    at_capacity_warned: AtomicBool,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `cap` requests per key per `window`.
    pub fn new(name: &'static str, cap: u32, window: Duration, max_entries: usize) -> Self {
        Self {
            name,
            buckets: DashMap::new(),
            cap,
            window,
            max_entries,
            at_capacity_warned: AtomicBool::new(false),
        }
    }

    /// Count a request for `key` against the current window.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_at(key, Instant::now())
    }

    /// Count a request as if the current time were `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitError> {
        // DashMap's len() can deadlock if called while holding an entry lock,
        // so capacity is sampled first. The race lets the map exceed
        // max_entries by at most the number of concurrent callers.
        let current_len = self.buckets.len();
        let at_capacity = current_len >= self.max_entries;

        let bucket = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                if now >= bucket.reset_at {
                    *bucket = Bucket {
                        count: 1,
                        reset_at: now + self.window,
                    };
                } else {
                    bucket.count = bucket.count.saturating_add(1);
                }
                *bucket
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    self.warn_at_capacity(current_len);
                    return Err(self.deny(
                        AT_CAPACITY_RETRY_AFTER_SECS,
                        RateLimitReason::AtCapacity,
                    ));
                }
                *entry.insert(Bucket {
                    count: 1,
                    reset_at: now + self.window,
                })
            }
        };

        if bucket.count <= self.cap {
            Ok(())
        } else {
            let remaining = bucket.reset_at.saturating_duration_since(now);
            Err(self.deny(ceil_secs(remaining), RateLimitReason::RateLimited))
        }
    }

    /// Drop every bucket whose window has elapsed.
    /// Returns the number of buckets removed.
    ///
    /// Uses atomic `remove_if` so a bucket refreshed between collection and
    /// removal is kept.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let stale: Vec<String> = self
            .buckets
            .iter()
            .filter(|entry| now >= entry.value().reset_at)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale {
            if self
                .buckets
                .remove_if(&key, |_, bucket| now >= bucket.reset_at)
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            // Let the capacity warning fire again if we fill up
            self.at_capacity_warned.store(false, Ordering::Relaxed);
        }
        evicted
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn deny(&self, retry_after_secs: u64, reason: RateLimitReason) -> RateLimitError {
        RATE_LIMIT_DENIALS
            .with_label_values(&[self.name, reason.as_str()])
            .inc();
        RateLimitError {
            retry_after_secs,
            reason,
        }
    }

    /// Log a warning when the limiter is at capacity (only once per capacity
    /// event). Thousands of requests per second may be rejected during an
    /// attack.
    fn warn_at_capacity(&self, current_entries: usize) {
        if !self.at_capacity_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                limiter = self.name,
                current_entries = current_entries,
                max_entries = self.max_entries,
                "Rate limiter at capacity, rejecting new entries. \
                 This warning is logged once per capacity event to prevent log spam."
            );
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

/// Inner state that's only allocated when rate limiting is enabled.
struct RateLimitStateInner {
    caller: FixedWindowLimiter,
    repeat_url: FixedWindowLimiter,
    trusted_proxies: TrustedProxies,
    /// Whether ConnectInfo missing warning has been logged.
    connect_info_warned: AtomicBool,
}

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for IP extraction.
#[derive(Clone, Debug)]
enum TrustedProxies {
    /// Never trust forwarded headers (default, most secure).
    None,
    /// Trust headers from all sources (dangerous, for development only).
    All,
    /// Trust headers only from specific IPs/CIDRs.
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            Self::None
        } else if proxies.len() == 1 && proxies[0] == "*" {
            Self::All
        } else {
            let entries: Vec<TrustedEntry> = proxies
                .iter()
                .filter_map(|p| {
                    if p.contains('/') {
                        match p.parse::<IpNet>() {
                            Ok(net) => Some(TrustedEntry::Cidr(net)),
                            Err(e) => {
                                tracing::warn!("Invalid CIDR in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    } else {
                        match p.parse::<IpAddr>() {
                            Ok(ip) => Some(TrustedEntry::Ip(ip)),
                            Err(e) => {
                                tracing::warn!("Invalid IP in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    }
                })
                .collect();
            Self::List(entries)
        }
    }

    /// Check if the given connection IP is a trusted proxy.
    fn is_trusted(&self, connection_ip: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => {
                let ip: IpAddr = match connection_ip.parse() {
                    Ok(ip) => ip,
                    Err(_) => return false,
                };
                entries.iter().any(|entry| match entry {
                    TrustedEntry::Ip(trusted) => *trusted == ip,
                    TrustedEntry::Cidr(network) => network.contains(&ip),
                })
            }
        }
    }
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        let max_entries = config.max_entries as usize;
        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                caller: FixedWindowLimiter::new(
                    "caller",
                    config.max_requests,
                    Duration::from_secs(config.window_secs),
                    max_entries,
                ),
                repeat_url: FixedWindowLimiter::new(
                    "repeat_url",
                    config.repeat_max_requests,
                    Duration::from_secs(config.repeat_window_secs),
                    max_entries,
                ),
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Count a request from `caller` against the general limiter.
    pub fn check_caller(&self, caller: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.caller.check(caller),
            None => Ok(()),
        }
    }

    /// Count a request from `caller` for `target_url` against the repeat
    /// limiter. The URL is normalized first.
    pub fn check_repeat(&self, caller: &str, target_url: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner
                .repeat_url
                .check(&format!("{caller}|{}", normalize_url(target_url))),
            None => Ok(()),
        }
    }

    /// Clean up elapsed windows from both limiters.
    /// Returns the number of entries evicted.
    pub fn cleanup(&self) -> usize {
        let inner = match &self.inner {
            Some(inner) => inner,
            None => return 0,
        };

        let now = Instant::now();
        let caller_evicted = inner.caller.cleanup_at(now);
        let repeat_evicted = inner.repeat_url.cleanup_at(now);
        let total_evicted = caller_evicted + repeat_evicted;

        if total_evicted > 0 {
            tracing::debug!(
                total_evicted = total_evicted,
                caller_evicted = caller_evicted,
                repeat_evicted = repeat_evicted,
                caller_entries = inner.caller.len(),
                repeat_entries = inner.repeat_url.len(),
                "Rate limiter cleanup completed"
            );
        }

        total_evicted
    }

    /// Get the current number of tracked entries as `(caller, repeat_url)`.
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(inner) => (inner.caller.len(), inner.repeat_url.len()),
            None => (0, 0),
        }
    }

    /// Opaque identity of the caller behind `req`.
    ///
    /// `token:<sha256 hex>` when the request carries a bearer token,
    /// otherwise `ip:<address>`.
    pub fn caller_identity(&self, req: &Request<Body>) -> String {
        if let Some(token) = bearer_token(req) {
            let digest = Sha256::digest(token.as_bytes());
            return format!("token:{}", hex::encode(digest));
        }
        format!("ip:{}", extract_ip(req, self))
    }

    /// Log a warning if ConnectInfo is not available (only once).
    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner
            && !inner.connect_info_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "ConnectInfo not available for rate limiting. All anonymous requests will share \
                 a single rate limit bucket ('unknown' IP). Add \
                 .into_make_service_with_connect_info::<SocketAddr>() to your server \
                 configuration to enable per-IP rate limiting."
            );
        }
    }
}

/// Reason for rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Request exceeded rate limit.
    RateLimited,
    /// Rate limiter at capacity, cannot track new entries.
    AtCapacity,
}

impl RateLimitReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AtCapacity => "at_capacity",
        }
    }
}

/// Error returned when rate limit is exceeded.
#[derive(Debug, thiserror::Error)]
#[error("rate limited ({reason:?}), retry after {retry_after_secs}s")]
pub struct RateLimitError {
    /// Number of seconds to wait before retrying.
    pub retry_after_secs: u64,
    /// Reason for the rate limit.
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let (code, message) = match self.reason {
            RateLimitReason::RateLimited => (
                "rate_limit_exceeded",
                format!(
                    "Rate limit exceeded. Retry after {} seconds.",
                    self.retry_after_secs
                ),
            ),
            RateLimitReason::AtCapacity => (
                "rate_limiter_at_capacity",
                "Server is experiencing high load. Please retry later.".to_string(),
            ),
        };

        let body = serde_json::json!({
            "code": code,
            "message": message,
            "retry_after": self.retry_after_secs,
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, self.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response()
    }
}

/// Normalize a target URL for repeat-request keying.
///
/// Trims whitespace, drops the fragment, and lowercases the scheme and
/// authority. Path and query are kept verbatim.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fragment = match trimmed.find('#') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    let Some(scheme_end) = without_fragment.find("://") else {
        return without_fragment.to_string();
    };
    let (scheme, rest) = without_fragment.split_at(scheme_end);
    let rest = &rest[3..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        authority.to_ascii_lowercase(),
        tail
    )
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Extract client IP address from request headers (only if trusted).
fn extract_forwarded_ip(req: &Request<Body>) -> Option<String> {
    // Try to get IP from X-Forwarded-For header first (for reverse proxy setups)
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(s) = forwarded.to_str()
    {
        // Take the first IP in the chain (client IP)
        if let Some(ip) = s.split(',').next() {
            return Some(ip.trim().to_string());
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
    {
        return Some(s.trim().to_string());
    }

    None
}

/// Extract connection IP from request extensions (set by ConnectInfo).
fn extract_connection_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Extract client IP address from request.
///
/// # Security
///
/// This function respects the trusted_proxies configuration:
/// - If no proxies are trusted, always uses the direct connection IP
/// - If specific proxies are trusted, only reads forwarded headers when
///   the connection comes from a trusted proxy IP
/// - If all proxies are trusted ("*"), always reads forwarded headers (unsafe)
fn extract_ip(req: &Request<Body>, state: &RateLimitState) -> String {
    let inner = match &state.inner {
        Some(inner) => inner,
        None => return "unknown".to_string(),
    };

    let connection_ip = extract_connection_ip(req);

    let trust_headers = match (&connection_ip, &inner.trusted_proxies) {
        (None, TrustedProxies::All) => true,
        // Can't verify the proxy without a connection IP
        (None, TrustedProxies::List(_)) => false,
        (None, TrustedProxies::None) => false,
        (Some(conn_ip), trusted_proxies) => trusted_proxies.is_trusted(conn_ip),
    };

    if trust_headers && let Some(forwarded_ip) = extract_forwarded_ip(req) {
        return forwarded_ip;
    }

    match connection_ip {
        Some(ip) => ip,
        None => {
            state.warn_connect_info_missing();
            "unknown".to_string()
        }
    }
}

/// Per-caller rate limiting middleware.
///
/// Applied to the API routes. Preview downloads check the same limiter
/// from the handler, after the link signature has been verified.
pub async fn caller_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let caller = rate_limit.caller_identity(&req);
    match rate_limit.check_caller(&caller) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Spawn a background task that periodically drops elapsed windows.
/// The task stops when `shutdown` is cancelled.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = state.cleanup();
                    if evicted > 0 {
                        tracing::info!(
                            evicted = evicted,
                            "Rate limiter cleanup task evicted stale entries"
                        );
                    }
                }
            }
        }
        tracing::debug!("Rate limiter cleanup task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests,
            window_secs: 60,
            max_entries: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_rate_limit_state_disabled() {
        let config = RateLimitConfig {
            enabled: false,
            max_requests: 0,
            ..Default::default()
        };
        let state = RateLimitState::new(&config);
        assert!(!state.is_enabled());
        assert!(state.check_caller("ip:127.0.0.1").is_ok());
        assert!(state.check_repeat("ip:127.0.0.1", "https://ozon.ru/x").is_ok());
        assert_eq!(state.cleanup(), 0);
    }

    #[test]
    fn test_allows_exactly_cap_per_window() {
        let state = RateLimitState::new(&enabled(5));
        assert!(state.is_enabled());

        for _ in 0..5 {
            assert!(state.check_caller("ip:127.0.0.1").is_ok());
        }

        let err = state.check_caller("ip:127.0.0.1").unwrap_err();
        assert_eq!(err.reason, RateLimitReason::RateLimited);
        assert!(err.retry_after_secs >= 1 && err.retry_after_secs <= 60);

        // Different caller has its own window
        assert!(state.check_caller("ip:192.168.1.1").is_ok());
    }

    #[test]
    fn test_window_resets_after_elapsing() {
        let limiter = FixedWindowLimiter::new("test", 2, Duration::from_secs(10), 100);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_ok());
        assert!(limiter.check_at("k", start).is_ok());
        let err = limiter
            .check_at("k", start + Duration::from_millis(2500))
            .unwrap_err();
        assert_eq!(err.retry_after_secs, 8);

        let later = start + Duration::from_secs(10);
        assert!(limiter.check_at("k", later).is_ok());
        assert!(limiter.check_at("k", later).is_ok());
        assert!(limiter.check_at("k", later).is_err());
    }

    #[test]
    fn test_zero_cap_denies_everything() {
        let limiter = FixedWindowLimiter::new("test", 0, Duration::from_secs(10), 100);
        assert!(limiter.check("k").is_err());
    }

    #[test]
    fn test_rate_limit_max_entries() {
        let config = RateLimitConfig {
            max_entries: 3,
            ..enabled(60)
        };
        let state = RateLimitState::new(&config);

        assert!(state.check_caller("ip:1.1.1.1").is_ok());
        assert!(state.check_caller("ip:2.2.2.2").is_ok());
        assert!(state.check_caller("ip:3.3.3.3").is_ok());

        // Next new caller should be rejected
        let err = state.check_caller("ip:4.4.4.4").unwrap_err();
        assert_eq!(err.reason, RateLimitReason::AtCapacity);
        assert_eq!(err.retry_after_secs, AT_CAPACITY_RETRY_AFTER_SECS);

        // Existing callers should still work
        assert!(state.check_caller("ip:1.1.1.1").is_ok());
    }

    #[test]
    fn test_cleanup_drops_only_elapsed_windows() {
        let limiter = FixedWindowLimiter::new("test", 5, Duration::from_secs(10), 100);
        let start = Instant::now();

        limiter.check_at("old", start).unwrap();
        limiter
            .check_at("fresh", start + Duration::from_secs(8))
            .unwrap();
        assert_eq!(limiter.len(), 2);

        let evicted = limiter.cleanup_at(start + Duration::from_secs(10));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_cleanup_frees_capacity() {
        let limiter = FixedWindowLimiter::new("test", 5, Duration::from_secs(1), 1);
        let start = Instant::now();

        limiter.check_at("a", start).unwrap();
        assert!(limiter.check_at("b", start).is_err());

        limiter.cleanup_at(start + Duration::from_secs(1));
        assert!(
            limiter
                .check_at("b", start + Duration::from_secs(1))
                .is_ok()
        );
    }

    #[test]
    fn test_repeat_limiter_is_keyed_by_caller_and_normalized_url() {
        let config = RateLimitConfig {
            repeat_max_requests: 2,
            ..enabled(100)
        };
        let state = RateLimitState::new(&config);

        assert!(
            state
                .check_repeat("ip:1.1.1.1", "https://WWW.Ozon.ru/product/1#reviews")
                .is_ok()
        );
        assert!(
            state
                .check_repeat("ip:1.1.1.1", "  https://www.ozon.ru/product/1 ")
                .is_ok()
        );
        assert!(
            state
                .check_repeat("ip:1.1.1.1", "https://www.ozon.ru/product/1")
                .is_err()
        );

        // Another product or another caller is counted separately
        assert!(
            state
                .check_repeat("ip:1.1.1.1", "https://www.ozon.ru/product/2")
                .is_ok()
        );
        assert!(
            state
                .check_repeat("ip:2.2.2.2", "https://www.ozon.ru/product/1")
                .is_ok()
        );
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" HTTPS://Www.WildBerries.RU/catalog/1/Detail.aspx?Size=M#top "),
            "https://www.wildberries.ru/catalog/1/Detail.aspx?Size=M"
        );
        assert_eq!(
            normalize_url("https://LAMODA.ru?Q=1"),
            "https://lamoda.ru?Q=1"
        );
        assert_eq!(normalize_url("not a url#x"), "not a url");
    }

    #[test]
    fn test_caller_identity_prefers_bearer_token() {
        let state = RateLimitState::new(&enabled(10));
        let req = Request::builder()
            .uri("/api/product/parse")
            .header("authorization", "Bearer secret-token")
            .body(Body::empty())
            .unwrap();

        let identity = state.caller_identity(&req);
        let expected = hex::encode(Sha256::digest(b"secret-token"));
        assert_eq!(identity, format!("token:{expected}"));
        assert!(!identity.contains("secret-token"));
    }

    #[test]
    fn test_caller_identity_uses_connection_ip() {
        let state = RateLimitState::new(&enabled(10));
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "9.9.9.9")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))));

        // Forwarded headers are ignored without trusted proxies
        assert_eq!(state.caller_identity(&req), "ip:10.0.0.7");
    }

    #[test]
    fn test_caller_identity_trusts_configured_proxy() {
        let config = RateLimitConfig {
            trusted_proxies: vec!["10.0.0.0/8".to_string()],
            ..enabled(10)
        };
        let state = RateLimitState::new(&config);
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "9.9.9.9, 10.0.0.7")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5000))));

        assert_eq!(state.caller_identity(&req), "ip:9.9.9.9");
    }

    #[test]
    fn test_trusted_proxies_none() {
        let proxies = TrustedProxies::from_config(&[]);
        assert!(!proxies.is_trusted("127.0.0.1"));
        assert!(!proxies.is_trusted("10.0.0.1"));
    }

    #[test]
    fn test_trusted_proxies_all() {
        let proxies = TrustedProxies::from_config(&["*".to_string()]);
        assert!(proxies.is_trusted("127.0.0.1"));
        assert!(proxies.is_trusted("anything"));
    }

    #[test]
    fn test_trusted_proxies_list() {
        let proxies =
            TrustedProxies::from_config(&["127.0.0.1".to_string(), "10.0.0.0/8".to_string()]);
        assert!(proxies.is_trusted("127.0.0.1"));
        assert!(proxies.is_trusted("10.255.255.255"));
        assert!(!proxies.is_trusted("192.168.1.1"));
        assert!(!proxies.is_trusted("11.0.0.1"));
    }

    #[test]
    fn test_error_response_has_retry_after() {
        let response = RateLimitError {
            retry_after_secs: 7,
            reason: RateLimitReason::RateLimited,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }
}
