//! Secret cache for reducing gateway calls
//!
//! In-memory TTL cache keyed by the session scope and the item's source path.
//! A value fetched under one credential identity is never served to another,
//! even when a fetch finishes after the session it started on was replaced.
//! An entry is fresh while `fetched_at.elapsed() < ttl`; stale entries are
//! overwritten in place on the next fetch, never evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::SecretString;

/// Freshness window of a cached value
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cached value with its reported version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSecret {
    pub value: SecretString,
    pub version: String,
    /// File name the path was first delivered as
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    scope: String,
    source_path: String,
}

impl CacheKey {
    fn new(scope: &str, source_path: &str) -> Self {
        Self { scope: scope.to_string(), source_path: source_path.to_string() }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    secret: CachedSecret,
    fetched_at: Instant,
}

/// Process-wide TTL cache of fetched secrets
#[derive(Debug, Clone)]
pub struct SecretCache {
    inner: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
}

impl SecretCache {
    /// Create a new cache with the specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Create a new cache with default TTL (5 minutes)
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Get a cached secret of `scope` if present and not expired
    pub async fn get_fresh(&self, scope: &str, source_path: &str) -> Option<CachedSecret> {
        let cache = self.inner.read().await;

        let entry = cache.get(&CacheKey::new(scope, source_path))?;
        if entry.fetched_at.elapsed() < self.ttl {
            debug!(item = %source_path, "Cache hit for secret");
            Some(entry.secret.clone())
        } else {
            debug!(item = %source_path, "Cache entry expired");
            None
        }
    }

    /// Insert or overwrite the value for `source_path` within `scope`.
    ///
    /// The file name recorded on first insert is kept on later overwrites.
    pub async fn store(
        &self,
        scope: &str,
        source_path: &str,
        file_name: &str,
        value: SecretString,
        version: String,
    ) -> CachedSecret {
        let mut cache = self.inner.write().await;
        let now = Instant::now();

        debug!(item = %source_path, ttl_secs = %self.ttl.as_secs(), "Caching secret");

        let entry = cache
            .entry(CacheKey::new(scope, source_path))
            .and_modify(|entry| {
                entry.secret.value = value.clone();
                entry.secret.version = version.clone();
                entry.fetched_at = now;
            })
            .or_insert_with(|| CacheEntry {
                secret: CachedSecret { value, version, file_name: file_name.to_string() },
                fetched_at: now,
            });
        entry.secret.clone()
    }

    /// Drop every entry outside `scope`
    pub async fn retain_scope(&self, scope: &str) {
        let mut cache = self.inner.write().await;
        let before = cache.len();
        cache.retain(|key, _| key.scope == scope);
        debug!(dropped = before - cache.len(), "Dropped secrets cached for other sessions");
    }

    /// Get the number of entries in the cache
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Get the TTL for this cache
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}
