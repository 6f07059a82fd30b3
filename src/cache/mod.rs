//! Claims cache
//!
//! Caches composed [`ApiClaims`] under a one-way fingerprint of the access
//! token, so repeated requests with the same token skip signature checks and
//! the user-info round trip.
//!
//! # TTL policy
//!
//! An entry expires at `min(token exp, now + max_lifetime)`. Claims are never
//! served after the token itself has expired, and never cached past the
//! configured ceiling even for long-lived tokens. The expiry is stored with
//! the entry and checked on read, so coarse backend TTLs cannot extend it.

mod memory;
mod redis_store;
mod store;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::claims::ApiClaims;
use crate::config::{CacheBackend, CacheConfig};
use crate::extractor::RawToken;
use crate::{Error, Result};

pub use memory::InMemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use store::{CacheError, CacheResult, CacheStore};

/// Cache key derived from a raw token.
///
/// `{prefix}:{hex(sha256(token))}`; the token itself is never stored.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The full cache key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(self.0.rfind(':').map_or(0, |i| i + 1) + 12);
        &self.0[..end]
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}…)", self.short())
    }
}

/// What is written to the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Composed claims
    pub claims: ApiClaims,
    /// Absolute expiry, unix seconds
    pub expires_at: i64,
}

/// Compute when a cache entry for a token must expire
#[must_use]
pub fn cache_expiry(token_expiry: i64, now: i64, max_lifetime: Duration) -> i64 {
    let ceiling = now.saturating_add(i64::try_from(max_lifetime.as_secs()).unwrap_or(i64::MAX));
    token_expiry.min(ceiling)
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries written
    pub writes: u64,
}

/// Open the configured store.
///
/// The in-memory store is also returned by its concrete type so the owner can
/// run periodic eviction on it.
///
/// # Errors
///
/// Returns an error if the redis backend has no URL or cannot be reached.
pub async fn store_from_config(
    config: &CacheConfig,
) -> Result<(Arc<dyn CacheStore>, Option<Arc<InMemoryCacheStore>>)> {
    match config.backend {
        CacheBackend::Memory => {
            let store = Arc::new(InMemoryCacheStore::new());
            Ok((store.clone() as Arc<dyn CacheStore>, Some(store)))
        }
        CacheBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                Error::Config("cache.redis_url is required for the redis backend".to_string())
            })?;
            let store = RedisCacheStore::connect(url).await?;
            Ok((Arc::new(store) as Arc<dyn CacheStore>, None))
        }
    }
}

/// Fingerprint-keyed claims cache on top of a pluggable [`CacheStore`]
pub struct ClaimsCache {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    max_lifetime: Duration,
    stats: CacheStats,
}

impl ClaimsCache {
    /// Create a claims cache over a store
    pub fn new(store: Arc<dyn CacheStore>, key_prefix: impl Into<String>, max_lifetime: Duration) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            max_lifetime,
            stats: CacheStats::default(),
        }
    }

    /// Name of the backing store
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Derive the cache key for a token
    #[must_use]
    pub fn fingerprint(&self, token: &RawToken) -> Fingerprint {
        let digest = Sha256::digest(token.as_str().as_bytes());
        Fingerprint(format!("{}:{}", self.key_prefix, hex::encode(digest)))
    }

    /// Look up cached claims
    pub async fn get(&self, fingerprint: &Fingerprint) -> CacheResult<Option<ApiClaims>> {
        let Some(bytes) = self.store.get(fingerprint.as_str()).await? else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::InvalidValue(e.to_string()))?;

        if entry.expires_at <= Utc::now().timestamp() {
            debug!(fingerprint = ?fingerprint, "Cached claims past their expiry");
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.claims))
    }

    /// Cache claims until the token expires or the lifetime ceiling is hit.
    ///
    /// Returns the absolute expiry written, or `None` if the claims would
    /// already be expired and nothing was stored.
    pub async fn set(&self, fingerprint: &Fingerprint, claims: &ApiClaims) -> CacheResult<Option<i64>> {
        let now = Utc::now().timestamp();
        let expires_at = cache_expiry(claims.expiry(), now, self.max_lifetime);
        if expires_at <= now {
            return Ok(None);
        }

        let entry = CacheEntry {
            claims: claims.clone(),
            expires_at,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| CacheError::InvalidValue(e.to_string()))?;
        let ttl = Duration::from_secs(expires_at.abs_diff(now));

        self.store.set(fingerprint.as_str(), bytes, ttl).await?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        debug!(fingerprint = ?fingerprint, ttl_secs = ttl.as_secs(), "Cached claims");

        Ok(Some(expires_at))
    }

    /// Drop cached claims for a token
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> CacheResult<bool> {
        Ok(self.store.delete(fingerprint.as_str()).await? > 0)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
        }
    }
}
