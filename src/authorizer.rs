//! Request authorization
//!
//! [`Authorizer`] runs the whole pipeline for one request:
//!
//! ```text
//! headers ─► extract token ─► cache lookup ─┬─ hit ──────────────────────────────► Allow
//!                                           └─ miss ─► verify ─► user info ─►
//!                                              custom claims ─► compose ─► cache write ─► Allow
//! ```
//!
//! Any failure ends the pipeline. Token problems become a bare 401; failures
//! of a dependency behind a valid token become a 500 with a correlation id
//! that is logged next to the real cause.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;
use tracing::{Instrument, Span, debug, error, field, info, info_span, warn};

use crate::cache::{self, CacheError, CacheStore, ClaimsCache, Fingerprint};
use crate::claims::ApiClaims;
use crate::composer::{ClaimsComposer, CustomClaimsError};
use crate::config::Config;
use crate::error::{ApiError, codes};
use crate::extractor::{ExtractError, RawToken, extract_bearer_token};
use crate::keys::KeySetRetriever;
use crate::userinfo::{UserInfoClient, UserInfoError};
use crate::verifier::{TokenVerifier, VerificationError};
use crate::{Error, Result};

/// Outcome of authorizing one request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    /// Caller is authenticated, these are its claims
    Allow(ApiClaims),
    /// Request must be answered with this error
    Deny(ApiError),
}

impl AuthDecision {
    /// Convert into a `Result` for `?` in handlers
    pub fn into_result(self) -> std::result::Result<ApiClaims, ApiError> {
        match self {
            Self::Allow(claims) => Ok(claims),
            Self::Deny(error) => Err(error),
        }
    }

    /// Whether the request was allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Pipeline stage, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the `Authorization` header
    Extract,
    /// Claims cache lookup or write
    Cache,
    /// Key resolution and token validation
    Verify,
    /// User-info endpoint call
    UserInfo,
    /// Custom claims supplier
    CustomClaims,
    /// Fault injection
    Simulation,
}

impl Stage {
    /// Name used in log fields
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Cache => "cache",
            Self::Verify => "verify",
            Self::UserInfo => "user_info",
            Self::CustomClaims => "custom_claims",
            Self::Simulation => "simulation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal cause of a denied or failed request
#[derive(Debug, Error)]
pub enum AuthFailure {
    /// No usable bearer token
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Token rejected, or its key could not be resolved
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// User-info endpoint failed
    #[error(transparent)]
    UserInfo(#[from] UserInfoError),
    /// Custom claims supplier failed
    #[error(transparent)]
    CustomClaims(#[from] CustomClaimsError),
    /// Claims cache failed
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Injected via the exception simulation header
    #[error("simulated exception")]
    SimulatedException,
}

impl AuthFailure {
    /// Where in the pipeline this happened
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Extract(_) => Stage::Extract,
            Self::Verification(_) => Stage::Verify,
            Self::UserInfo(_) => Stage::UserInfo,
            Self::CustomClaims(_) => Stage::CustomClaims,
            Self::Cache(_) => Stage::Cache,
            Self::SimulatedException => Stage::Simulation,
        }
    }

    /// Token problems are denials (401); the rest are server failures (500)
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Extract(_) | Self::Verification(_))
    }
}

/// Turns request headers into [`ApiClaims`] or an [`ApiError`]
pub struct Authorizer {
    api_name: String,
    simulation_header: HeaderName,
    keys: Arc<KeySetRetriever>,
    verifier: TokenVerifier,
    user_info: UserInfoClient,
    composer: ClaimsComposer,
    cache: ClaimsCache,
}

impl Authorizer {
    /// Build from configuration, connecting to the configured cache backend
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable or the cache
    /// backend cannot be reached.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, _) = cache::store_from_config(&config.cache).await?;

        Self::new(config, store, ClaimsComposer::from_config(&config.custom_claims))
    }

    /// Build with an explicit cache store and claims composer
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable.
    pub fn new(config: &Config, store: Arc<dyn CacheStore>, composer: ClaimsComposer) -> Result<Self> {
        let simulation_header = HeaderName::from_bytes(config.api.exception_simulation_header.as_bytes())
            .map_err(|e| Error::Config(format!("api.exception_simulation_header: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.oauth.http_timeout)
            .build()?;
        let keys = Arc::new(KeySetRetriever::with_client(&config.oauth, http.clone())?);

        Ok(Self {
            api_name: config.api.name.clone(),
            simulation_header,
            verifier: TokenVerifier::new(&config.oauth, keys.clone()),
            keys,
            user_info: UserInfoClient::with_client(&config.oauth, http),
            composer,
            cache: ClaimsCache::new(store, config.cache.key_prefix.clone(), config.cache.max_lifetime),
        })
    }

    /// Pre-fetch signing keys. Failure is logged; the first request retries.
    pub async fn warm(&self) {
        match self.keys.warm().await {
            Ok(count) => info!(keys = count, "Signing keys loaded"),
            Err(e) => warn!(error = %e, "Could not pre-fetch signing keys"),
        }
    }

    /// Signing key retriever
    #[must_use]
    pub fn keys(&self) -> &KeySetRetriever {
        &self.keys
    }

    /// Claims cache
    #[must_use]
    pub fn cache(&self) -> &ClaimsCache {
        &self.cache
    }

    /// Authorize one request
    pub async fn authorize(&self, headers: &HeaderMap) -> AuthDecision {
        let span = info_span!(
            "authorize",
            subject = field::Empty,
            cache_hit = field::Empty
        );

        async move {
            let started = Instant::now();
            match self.run(headers).await {
                Ok(claims) => {
                    debug!(elapsed_ms = started.elapsed().as_millis(), "Request authorized");
                    AuthDecision::Allow(claims)
                }
                Err(failure) => AuthDecision::Deny(self.api_error(&failure)),
            }
        }
        .instrument(span)
        .await
    }

    /// Drop the cached claims for a token
    ///
    /// # Errors
    ///
    /// Returns the cache backend's error.
    pub async fn invalidate(&self, token: &RawToken) -> std::result::Result<bool, CacheError> {
        self.cache.invalidate(&self.cache.fingerprint(token)).await
    }

    async fn run(&self, headers: &HeaderMap) -> std::result::Result<ApiClaims, AuthFailure> {
        let token = extract_bearer_token(headers)?;
        let fingerprint = self.cache.fingerprint(&token);

        let claims = if let Some(claims) = self.cache.get(&fingerprint).await? {
            Span::current().record("cache_hit", true);
            debug!(fingerprint = ?fingerprint, "Claims served from cache");
            claims
        } else {
            Span::current().record("cache_hit", false);
            self.resolve(&token, &fingerprint).await?
        };
        Span::current().record("subject", claims.subject());

        if self.exception_simulated(headers) {
            return Err(AuthFailure::SimulatedException);
        }

        Ok(claims)
    }

    async fn resolve(
        &self,
        token: &RawToken,
        fingerprint: &Fingerprint,
    ) -> std::result::Result<ApiClaims, AuthFailure> {
        let base = self.verifier.verify(token).await?;
        let user_info = self.user_info.fetch(token).await?;
        let custom = self.composer.custom_claims(&base, &user_info).await?;
        let claims = ClaimsComposer::compose(base, user_info, custom);

        self.cache.set(fingerprint, &claims).await?;
        Ok(claims)
    }

    fn exception_simulated(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.simulation_header)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case(&self.api_name))
    }

    fn api_error(&self, failure: &AuthFailure) -> ApiError {
        let stage = failure.stage();

        if failure.is_denial() {
            if matches!(failure, AuthFailure::Verification(VerificationError::Key(_))) {
                error!(stage = %stage, error = %failure, "Signing key unavailable");
            } else {
                warn!(stage = %stage, error = %failure, "Request denied");
            }
            return ApiError::Unauthorized;
        }

        let code = if matches!(failure, AuthFailure::SimulatedException) {
            codes::EXCEPTION_SIMULATION
        } else {
            codes::SERVER_ERROR
        };
        let api_error = ApiError::server(code, self.api_name.clone());
        error!(
            stage = %stage,
            error = %failure,
            error_id = api_error.error_id(),
            "Request failed"
        );
        api_error
    }
}
