//! Signing key retrieval
//!
//! [`KeySetRetriever`] owns the authorization server's public keys, indexed by
//! key id. The key set is fetched lazily, refreshed when a token names a key
//! id we have not seen (key rotation) or when the set is older than the
//! configured TTL.
//!
//! # Refresh rules
//!
//! - At most one refresh is in flight. Requests that miss while a refresh is
//!   running wait for it and take its outcome instead of fetching again.
//! - A refresh replaces the whole set. Readers see the old set or the new one.
//! - Refreshes are rate limited, so a stream of tokens with made-up key ids
//!   cannot turn into a stream of JWKS requests.
//! - A failed refresh is not retried within the request.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse},
};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::{Error, Result};

type RefreshRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Key lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeySetError {
    /// No key with this id, even after a refresh (or the refresh was rate limited)
    #[error("signing key not found: {0}")]
    KeyNotFound(String),
    /// The key set could not be downloaded
    #[error("key set retrieval failed: {0}")]
    KeyRetrievalFailed(String),
}

/// A public key published by the authorization server
#[derive(Clone)]
pub struct SigningKey {
    /// `kid`
    pub key_id: String,
    /// `alg` from the JWK, if published
    pub algorithm: Option<Algorithm>,
    /// Key material for signature checks
    pub key: DecodingKey,
}

impl SigningKey {
    /// Whether this key may verify a token signed with `alg`
    #[must_use]
    pub fn permits(&self, alg: Algorithm) -> bool {
        self.algorithm.is_none_or(|published| published == alg)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

type KeyMap = HashMap<String, Arc<SigningKey>>;

/// Snapshot of the current key set
struct KeySetState {
    keys: Arc<KeyMap>,
    /// Bumped by every finished refresh attempt
    generation: u64,
    fetched_at: Option<Instant>,
    last_refresh_failed: bool,
}

impl KeySetState {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.is_none_or(|at| at.elapsed() >= ttl)
    }
}

/// Fetches and caches the authorization server's signing keys
pub struct KeySetRetriever {
    http: reqwest::Client,
    jwks_endpoint: String,
    cache_ttl: Duration,
    state: RwLock<KeySetState>,
    refresh_guard: Mutex<()>,
    limiter: RefreshRateLimiter,
    refreshes: AtomicU64,
}

impl KeySetRetriever {
    /// Create a retriever for the configured JWKS endpoint. Nothing is fetched yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh quota is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Self::with_client(config, http)
    }

    /// Create a retriever that shares an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh quota is invalid.
    pub fn with_client(config: &OAuthConfig, http: reqwest::Client) -> Result<Self> {
        let quota = Quota::with_period(config.jwks.refresh_period)
            .ok_or_else(|| Error::Config("oauth.jwks.refresh_period must be non-zero".to_string()))?
            .allow_burst(NonZeroU32::new(config.jwks.refresh_burst).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            jwks_endpoint: config.jwks_endpoint.clone(),
            cache_ttl: config.jwks.cache_ttl,
            state: RwLock::new(KeySetState {
                keys: Arc::new(HashMap::new()),
                generation: 0,
                fetched_at: None,
                last_refresh_failed: false,
            }),
            refresh_guard: Mutex::new(()),
            limiter: RateLimiter::direct(quota),
            refreshes: AtomicU64::new(0),
        })
    }

    /// Resolve a key id to a signing key, refreshing the key set if needed
    ///
    /// # Errors
    ///
    /// [`KeySetError::KeyNotFound`] if the key is absent after a refresh or
    /// the refresh was rate limited, [`KeySetError::KeyRetrievalFailed`] if
    /// the key set could not be downloaded.
    pub async fn get_key(&self, kid: &str) -> std::result::Result<Arc<SigningKey>, KeySetError> {
        let (cached, observed_generation) = {
            let state = self.state.read();
            if !state.is_stale(self.cache_ttl)
                && let Some(key) = state.keys.get(kid)
            {
                return Ok(key.clone());
            }
            (state.keys.get(kid).cloned(), state.generation)
        };

        let _guard = self.refresh_guard.lock().await;

        {
            let state = self.state.read();
            if state.generation != observed_generation {
                // A refresh finished while we waited; its outcome is ours
                return match state.keys.get(kid) {
                    Some(key) => Ok(key.clone()),
                    None if state.last_refresh_failed => Err(KeySetError::KeyRetrievalFailed(
                        "concurrent key set refresh failed".to_string(),
                    )),
                    None => Err(KeySetError::KeyNotFound(kid.to_string())),
                };
            }
        }

        if self.limiter.check().is_err() {
            return match cached {
                Some(key) => {
                    debug!(kid = %kid, "Key set refresh rate limited, using cached key");
                    Ok(key)
                }
                None => {
                    warn!(kid = %kid, "Key set refresh rate limited");
                    Err(KeySetError::KeyNotFound(kid.to_string()))
                }
            };
        }

        match self.refresh_locked().await {
            Ok(keys) => keys
                .get(kid)
                .cloned()
                .ok_or_else(|| KeySetError::KeyNotFound(kid.to_string())),
            Err(e) => match cached {
                Some(key) => {
                    warn!(kid = %kid, error = %e, "Key set refresh failed, using stale key");
                    Ok(key)
                }
                None => Err(e),
            },
        }
    }

    /// Fetch the key set ahead of the first request
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::KeyRetrievalFailed`] if the download fails.
    pub async fn warm(&self) -> std::result::Result<usize, KeySetError> {
        let _guard = self.refresh_guard.lock().await;
        // Counts against the refresh quota like any other refresh
        if self.limiter.check().is_err() {
            debug!("Refresh quota already spent, warming anyway");
        }
        let keys = self.refresh_locked().await?;
        Ok(keys.len())
    }

    /// Number of keys currently held
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.state.read().keys.len()
    }

    /// Number of outbound key set downloads attempted so far
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Download the key set and publish it. Caller holds `refresh_guard`.
    async fn refresh_locked(&self) -> std::result::Result<Arc<KeyMap>, KeySetError> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let fetched = self.fetch().await;

        let mut state = self.state.write();
        state.generation += 1;
        match fetched {
            Ok(keys) => {
                let keys = Arc::new(keys);
                info!(
                    keys = keys.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Key set refreshed"
                );
                state.keys = keys.clone();
                state.fetched_at = Some(Instant::now());
                state.last_refresh_failed = false;
                Ok(keys)
            }
            Err(e) => {
                state.last_refresh_failed = true;
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> std::result::Result<KeyMap, KeySetError> {
        debug!(endpoint = %self.jwks_endpoint, "Fetching key set");
        let response = self
            .http
            .get(&self.jwks_endpoint)
            .send()
            .await
            .map_err(|e| KeySetError::KeyRetrievalFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::KeyRetrievalFailed(format!(
                "JWKS endpoint returned {status}"
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySetError::KeyRetrievalFailed(e.to_string()))?;

        Ok(signing_keys(&jwks))
    }
}

/// Index the verification keys of a JWK set by key id.
///
/// Encryption keys, symmetric keys and keys without a `kid` are skipped.
fn signing_keys(jwks: &JwkSet) -> KeyMap {
    jwks.keys
        .iter()
        .filter_map(|jwk| match signing_key(jwk) {
            Ok(key) => key.map(|key| (key.key_id.clone(), Arc::new(key))),
            Err(e) => {
                warn!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                None
            }
        })
        .collect()
}

fn signing_key(jwk: &Jwk) -> std::result::Result<Option<SigningKey>, jsonwebtoken::errors::Error> {
    let Some(key_id) = jwk.common.key_id.clone() else {
        return Ok(None);
    };
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
        || matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_))
    {
        return Ok(None);
    }

    Ok(Some(SigningKey {
        key_id,
        algorithm: jwk.common.key_algorithm.as_ref().and_then(signature_algorithm),
        key: DecodingKey::from_jwk(jwk)?,
    }))
}

fn signature_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
