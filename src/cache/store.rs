//! Cache store interface
//!
//! The claims cache only decides *what* to store and for how long. Where the
//! bytes live is up to a [`CacheStore`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization)
#[derive(Debug, Error)]
pub enum CacheError {
    /// Could not connect to the backend
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    /// The backend rejected or failed a command
    #[error("cache command error: {0}")]
    BackendCommand(String),
    /// Stored bytes could not be (de)serialized
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// Byte-oriented key/value store with per-entry TTL.
///
/// `set` always overwrites; there is no read-modify-write.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    /// Fetch a value; expired entries are absent
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value, replacing any existing one
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Remove a key, returns the number of removed entries
    async fn delete(&self, key: &str) -> CacheResult<u64>;
}
