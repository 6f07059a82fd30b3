//! Bearer token extraction from the `Authorization` header

use std::fmt;

use axum::http::{HeaderMap, header};
use thiserror::Error;

/// Why no token could be taken from the request
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    /// No `Authorization` header
    #[error("missing authorization header")]
    Missing,
    /// Header present but not a single well-formed bearer credential
    #[error("malformed authorization header")]
    Malformed,
}

/// The bearer credential of one request.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    /// Wrap a token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawToken(<{} bytes>)", self.0.len())
    }
}

/// Extract the bearer token from request headers.
///
/// Accepts exactly one `Authorization` header of the form `Bearer <token>`.
/// The scheme is matched case-insensitively; the token must be non-empty and
/// contain no whitespace.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<RawToken, ExtractError> {
    let mut values = headers.get_all(header::AUTHORIZATION).iter();
    let value = values.next().ok_or(ExtractError::Missing)?;
    if values.next().is_some() {
        return Err(ExtractError::Malformed);
    }

    let value = value.to_str().map_err(|_| ExtractError::Malformed)?;
    let (scheme, token) = value.split_once(' ').ok_or(ExtractError::Malformed)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ExtractError::Malformed);
    }
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(ExtractError::Malformed);
    }

    Ok(RawToken::new(token))
}
