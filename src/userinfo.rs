//! User-info lookup
//!
//! Access tokens carry the subject but not the user's name or email. Those
//! come from the authorization server's user-info endpoint, called with the
//! same bearer token the client presented.

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::claims::UserInfoClaims;
use crate::config::OAuthConfig;
use crate::extractor::RawToken;
use crate::Result;

/// User-info lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserInfoError {
    /// Transport failure, non-2xx status or an unreadable body
    #[error("user info retrieval failed: {0}")]
    RetrievalFailed(String),
}

/// Client for the user-info endpoint
pub struct UserInfoClient {
    http: reqwest::Client,
    endpoint: String,
}

impl UserInfoClient {
    /// Create a client for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self::with_client(config, http))
    }

    /// Create a client that shares an existing HTTP client
    #[must_use]
    pub fn with_client(config: &OAuthConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: config.userinfo_endpoint.clone(),
        }
    }

    /// Fetch the user's identity claims
    ///
    /// # Errors
    ///
    /// Returns [`UserInfoError::RetrievalFailed`] on any transport, status or
    /// decoding failure. Nothing is retried.
    pub async fn fetch(&self, token: &RawToken) -> std::result::Result<UserInfoClaims, UserInfoError> {
        let started = Instant::now();
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UserInfoError::RetrievalFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UserInfoError::RetrievalFailed(format!(
                "user info endpoint returned {status}"
            )));
        }

        let claims: UserInfoClaims = response
            .json()
            .await
            .map_err(|e| UserInfoError::RetrievalFailed(e.to_string()))?;

        debug!(
            elapsed_ms = started.elapsed().as_millis(),
            "User info fetched"
        );
        Ok(claims)
    }
}
