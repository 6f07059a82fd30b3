//! Configuration management

use std::{collections::HashMap, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable prefix, nested keys are separated by `__`
pub const ENV_PREFIX: &str = "API_AUTHORIZER_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// API identity and fault injection
    pub api: ApiConfig,
    /// Authorization server settings
    pub oauth: OAuthConfig,
    /// Claims cache
    pub cache: CacheConfig,
    /// Reference custom claims supplier
    pub custom_claims: CustomClaimsConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the authorizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.oauth.issuer.trim().is_empty() {
            return Err(Error::Config("oauth.issuer is required".to_string()));
        }
        if self.oauth.audiences.iter().all(|a| a.trim().is_empty()) {
            return Err(Error::Config(
                "oauth.audiences needs at least one audience".to_string(),
            ));
        }
        if self.oauth.algorithms.is_empty() {
            return Err(Error::Config(
                "oauth.algorithms needs at least one algorithm".to_string(),
            ));
        }
        if self.oauth.jwks_endpoint.trim().is_empty() {
            return Err(Error::Config("oauth.jwks_endpoint is required".to_string()));
        }
        if self.oauth.userinfo_endpoint.trim().is_empty() {
            return Err(Error::Config(
                "oauth.userinfo_endpoint is required".to_string(),
            ));
        }
        for (name, value) in [
            ("oauth.jwks_endpoint", &self.oauth.jwks_endpoint),
            ("oauth.userinfo_endpoint", &self.oauth.userinfo_endpoint),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::Config(format!("{name} is not a valid URL: {e}")))?;
        }
        if self.oauth.jwks.refresh_burst == 0 {
            return Err(Error::Config(
                "oauth.jwks.refresh_burst must be at least 1".to_string(),
            ));
        }
        if self.oauth.jwks.refresh_period.is_zero() {
            return Err(Error::Config(
                "oauth.jwks.refresh_period must be non-zero".to_string(),
            ));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(Error::Config(
                "cache.redis_url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// API identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API name, reported as `area` in server error bodies
    pub name: String,
    /// Header that triggers a simulated exception when its value equals `name`
    pub exception_simulation_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            name: "SampleApi".to_string(),
            exception_simulation_header: "x-mycompany-test-exception".to_string(),
        }
    }
}

/// Authorization server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Expected `iss` claim
    pub issuer: String,
    /// Accepted `aud` values
    pub audiences: Vec<String>,
    /// Accepted signing algorithms
    pub algorithms: Vec<Algorithm>,
    /// JWKS document URL
    pub jwks_endpoint: String,
    /// User-info endpoint URL
    pub userinfo_endpoint: String,
    /// Tolerated clock difference for `exp` / `nbf`
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
    /// Timeout for outbound calls to the authorization server
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// Key set caching
    pub jwks: JwksConfig,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audiences: Vec::new(),
            algorithms: vec![Algorithm::RS256],
            jwks_endpoint: String::new(),
            userinfo_endpoint: String::new(),
            clock_skew: Duration::ZERO,
            http_timeout: Duration::from_secs(10),
            jwks: JwksConfig::default(),
        }
    }
}

/// Key set cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwksConfig {
    /// How long a fetched key set is trusted before a refresh
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Refreshes allowed back to back
    pub refresh_burst: u32,
    /// One refresh allowance is regained per period
    #[serde(with = "humantime_serde")]
    pub refresh_period: Duration,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(12 * 3600),
            refresh_burst: 5,
            refresh_period: Duration::from_secs(30),
        }
    }
}

/// Claims cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map
    #[default]
    Memory,
    /// Redis / Valkey
    Redis,
}

/// Claims cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which store holds cached claims
    pub backend: CacheBackend,
    /// Redis URL, e.g. `redis://localhost:6379`
    pub redis_url: Option<String>,
    /// Prefix for every cache key
    pub key_prefix: String,
    /// Hard ceiling on how long claims stay cached, even for long-lived tokens
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            key_prefix: "claims".to_string(),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

/// Configuration of the region-based custom claims supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomClaimsConfig {
    /// Use the region supplier instead of empty custom claims
    pub enabled: bool,
    /// Role for subjects without an entry in `subjects`
    pub default_role: String,
    /// Regions for subjects without an entry in `subjects`
    pub default_regions: Vec<String>,
    /// Per-subject overrides
    pub subjects: HashMap<String, SubjectClaimsConfig>,
}

impl Default for CustomClaimsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_role: "user".to_string(),
            default_regions: vec!["USA".to_string()],
            subjects: HashMap::new(),
        }
    }
}

/// Custom claims for one subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectClaimsConfig {
    /// Role name
    pub role: String,
    /// Authorized regions
    pub regions: Vec<String>,
}
