//! Short-lived cache of parsed products.
//!
//! A parse hands out an opaque product id; a later try-on resolves it back
//! to a garment image without re-scraping. Entries are capped by count and
//! age, and evicted oldest-first.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;
use vitrine_core::config::ProductCacheConfig;

/// Opaque, random product identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct CachedProduct {
    images: Vec<String>,
    created_at: Instant,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<ProductId, CachedProduct>,
    /// Ids in creation order.
    order: VecDeque<ProductId>,
}

impl CacheInner {
    /// Drop expired entries and make room for `incoming` more.
    fn sweep(&mut self, now: Instant, ttl: Duration, max_entries: usize, incoming: usize) -> usize {
        let mut removed = 0;
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .is_none_or(|entry| now.duration_since(entry.created_at) >= ttl);
            let over_budget = self.entries.len() + incoming > max_entries;
            if !expired && !over_budget {
                break;
            }
            if let Some(id) = self.order.pop_front() {
                self.entries.remove(&id);
                removed += 1;
            }
        }
        removed
    }
}

/// Parsed product cache.
pub struct ParsedProductCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
}

impl ParsedProductCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
            max_entries,
        }
    }

    pub fn from_config(config: &ProductCacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    /// Store a product's images and return the id that resolves them.
    pub fn remember(&self, images: Vec<String>) -> ProductId {
        let id = ProductId::generate();
        let mut inner = self.lock();
        inner.sweep(Instant::now(), self.ttl, self.max_entries, 1);
        if self.max_entries > 0 {
            inner.entries.insert(
                id.clone(),
                CachedProduct {
                    images,
                    created_at: Instant::now(),
                },
            );
            inner.order.push_back(id.clone());
        }
        id
    }

    /// Image `index` of a cached, unexpired product.
    pub fn resolve(&self, id: &str, index: usize) -> Option<String> {
        let inner = self.lock();
        let entry = inner.entries.get(&ProductId(id.to_string()))?;
        if entry.created_at.elapsed() >= self.ttl {
            return None;
        }
        entry.images.get(index).cloned()
    }

    /// Drop expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.lock()
            .sweep(Instant::now(), self.ttl, self.max_entries, 0)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("product cache mutex was poisoned, recovering with into_inner()");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://cdn.example/{i}.jpg"))
            .collect()
    }

    #[test]
    fn test_remember_then_resolve() {
        let cache = ParsedProductCache::new(Duration::from_secs(60), 10);
        let id = cache.remember(images(3));

        assert_eq!(
            cache.resolve(id.as_str(), 0).as_deref(),
            Some("https://cdn.example/0.jpg")
        );
        assert_eq!(
            cache.resolve(id.as_str(), 2).as_deref(),
            Some("https://cdn.example/2.jpg")
        );
        assert_eq!(cache.resolve(id.as_str(), 3), None);
        assert_eq!(cache.resolve("unknown", 0), None);
    }

    #[test]
    fn test_ids_are_unique_and_opaque() {
        let cache = ParsedProductCache::new(Duration::from_secs(60), 10);
        let a = cache.remember(images(1));
        let b = cache.remember(images(1));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let cache = ParsedProductCache::new(Duration::from_secs(60), 2);
        let a = cache.remember(images(1));
        let b = cache.remember(images(1));
        let c = cache.remember(images(1));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.resolve(a.as_str(), 0), None);
        assert!(cache.resolve(b.as_str(), 0).is_some());
        assert!(cache.resolve(c.as_str(), 0).is_some());
    }

    #[test]
    fn test_expired_entries_are_absent_and_swept() {
        let cache = ParsedProductCache::new(Duration::from_millis(20), 10);
        let id = cache.remember(images(1));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.resolve(id.as_str(), 0), None);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let cache = ParsedProductCache::new(Duration::from_secs(60), 0);
        let id = cache.remember(images(1));
        assert_eq!(cache.resolve(id.as_str(), 0), None);
        assert!(cache.is_empty());
    }
}
