//! Access token verification
//!
//! # Verification flow
//!
//! 1. Decode the JWT header (no verification) to read `alg` and `kid`.
//! 2. Check `alg` against the configured allow-list.
//! 3. Resolve `kid` through the [`KeySetRetriever`].
//! 4. Verify the signature with `jsonwebtoken`.
//! 5. Check `iss`, `aud`, `nbf`, `exp` and `sub` ourselves, with one clock
//!    skew for both time claims.
//!
//! Every failure has its own [`VerificationError`] variant for logs, but
//! callers answer all of them with the same 401.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::claims::BaseClaims;
use crate::config::OAuthConfig;
use crate::extractor::RawToken;
use crate::keys::{KeySetError, KeySetRetriever};

/// Why a token was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// Not a structurally valid JWT, or a required claim is missing
    #[error("malformed token: {0}")]
    TokenMalformed(String),
    /// `alg` is not accepted
    #[error("algorithm not allowed: {0:?}")]
    AlgorithmNotAllowed(Algorithm),
    /// The header has no `kid`
    #[error("token header has no key id")]
    MissingKeyId,
    /// The signing key could not be resolved
    #[error(transparent)]
    Key(#[from] KeySetError),
    /// Signature check failed
    #[error("invalid token signature")]
    SignatureInvalid,
    /// `iss` does not match
    #[error("unexpected issuer")]
    IssuerInvalid,
    /// `aud` does not contain an accepted audience
    #[error("unexpected audience")]
    AudienceInvalid,
    /// `nbf` is in the future
    #[error("token not yet valid")]
    TokenNotYetValid,
    /// `exp` has passed
    #[error("token expired")]
    TokenExpired,
}

/// Payload claims we look at
#[derive(Debug, Clone, Default, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Value>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    scp: Option<Vec<String>>,
}

/// Validates access tokens against the authorization server's keys
pub struct TokenVerifier {
    issuer: String,
    audiences: Vec<String>,
    algorithms: Vec<Algorithm>,
    clock_skew: i64,
    keys: Arc<KeySetRetriever>,
}

impl TokenVerifier {
    /// Create a verifier for the configured issuer and audiences
    #[must_use]
    pub fn new(config: &OAuthConfig, keys: Arc<KeySetRetriever>) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audiences: config.audiences.clone(),
            algorithms: config.algorithms.clone(),
            clock_skew: i64::try_from(config.clock_skew.as_secs()).unwrap_or(i64::MAX),
            keys,
        }
    }

    /// Verify a token and extract its base claims
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub async fn verify(&self, token: &RawToken) -> Result<BaseClaims, VerificationError> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Verify a token as of `now` (unix seconds)
    pub(crate) async fn verify_at(
        &self,
        token: &RawToken,
        now: i64,
    ) -> Result<BaseClaims, VerificationError> {
        let header = jsonwebtoken::decode_header(token.as_str())
            .map_err(|e| VerificationError::TokenMalformed(e.to_string()))?;

        if !self.algorithms.contains(&header.alg) {
            return Err(VerificationError::AlgorithmNotAllowed(header.alg));
        }

        let kid = header.kid.ok_or(VerificationError::MissingKeyId)?;
        let signing_key = self.keys.get_key(&kid).await?;
        if !signing_key.permits(header.alg) {
            return Err(VerificationError::AlgorithmNotAllowed(header.alg));
        }

        // Registered claims are checked below with our own clock and skew
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = jsonwebtoken::decode::<TokenClaims>(token.as_str(), &signing_key.key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    VerificationError::SignatureInvalid
                }
                _ => VerificationError::TokenMalformed(e.to_string()),
            })?;

        debug!(kid = %kid, "Token signature verified");
        self.check_claims(data.claims, now)
    }

    fn check_claims(&self, claims: TokenClaims, now: i64) -> Result<BaseClaims, VerificationError> {
        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(VerificationError::IssuerInvalid);
        }

        if !audience_matches(claims.aud.as_ref(), &self.audiences) {
            return Err(VerificationError::AudienceInvalid);
        }

        if let Some(nbf) = claims.nbf
            && nbf > now.saturating_add(self.clock_skew)
        {
            return Err(VerificationError::TokenNotYetValid);
        }

        let expiry = claims
            .exp
            .ok_or_else(|| VerificationError::TokenMalformed("missing exp claim".to_string()))?;
        if expiry.saturating_add(self.clock_skew) <= now {
            return Err(VerificationError::TokenExpired);
        }

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VerificationError::TokenMalformed("missing sub claim".to_string()))?;

        let scopes: BTreeSet<String> = claims
            .scope
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(str::to_string)
            .chain(claims.scp.into_iter().flatten())
            .collect();

        Ok(BaseClaims {
            subject,
            scopes,
            expiry,
        })
    }
}

/// `aud` may be a single string or an array of strings
fn audience_matches(aud: Option<&Value>, expected: &[String]) -> bool {
    match aud {
        Some(Value::String(s)) => expected.iter().any(|e| e == s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|v| v.as_str().is_some_and(|s| expected.iter().any(|e| e == s))),
        _ => false,
    }
}
