//! API Authorizer Library
//!
//! Request-time authorization for an API: turns the bearer access token of a
//! request into fully resolved, cacheable claims.
//!
//! # Pipeline
//!
//! - **Extraction**: exactly one `Authorization: Bearer <token>` header
//! - **Claims cache**: composed claims keyed by a SHA-256 fingerprint of the
//!   token, never cached past the token's own expiry
//! - **Key set**: JWKS download with single-flight, rate-limited refresh on
//!   unknown key ids
//! - **Verification**: signature, issuer, audience, not-before and expiry
//! - **User info**: name and email from the authorization server
//! - **Custom claims**: pluggable supplier for domain-specific claims
//!
//! All token problems are reported to callers as the same 401. Dependency
//! failures are 500s with a correlation id that appears in the logs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorizer;
pub mod cache;
pub mod claims;
pub mod cli;
pub mod composer;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod keys;
pub mod userinfo;
pub mod verifier;

pub use authorizer::{AuthDecision, Authorizer};
pub use claims::ApiClaims;
pub use error::{ApiError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
