//! Error types for the API authorizer
//!
//! Two layers live here:
//!
//! - [`Error`]: crate-level failures (configuration, startup, I/O) that never
//!   reach an API caller.
//! - [`ApiError`]: the externally visible outcome of a denied or failed
//!   request, rendered as the JSON error body.

use std::io;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for the API authorizer
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache backend could not be reached at startup
    #[error("Cache backend error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes returned to callers
pub mod codes {
    /// Any token extraction or validation failure
    pub const UNAUTHORIZED: &str = "unauthorized";
    /// Any dependency failure behind a valid token
    pub const SERVER_ERROR: &str = "server_error";
    /// Deliberately injected failure
    pub const EXCEPTION_SIMULATION: &str = "exception_simulation";
    /// A company id path segment that is not a positive integer
    pub const INVALID_COMPANY_ID: &str = "invalid_company_id";
    /// A company that does not exist or is outside the caller's regions
    pub const COMPANY_NOT_FOUND: &str = "company_not_found";
}

const MIN_ERROR_ID: u32 = 10_000;
const MAX_ERROR_ID: u32 = 99_999;

/// Externally visible failure of an API request.
///
/// Deliberately coarse: every token problem is the same `Unauthorized`, and
/// server errors only carry a correlation id that operators can find in the
/// logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed caller input, detail is returned to the caller
    #[error("{code}: {message}")]
    ClientInput {
        /// HTTP status (4xx)
        status: StatusCode,
        /// Error code
        code: &'static str,
        /// Caller-facing message
        message: String,
    },

    /// Missing, invalid or expired access token
    #[error("unauthorized")]
    Unauthorized,

    /// Dependency failure or simulated exception
    #[error("{code} (area={area}, id={id})")]
    Server {
        /// Error code (`server_error` or `exception_simulation`)
        code: &'static str,
        /// API name reported as the error area
        area: String,
        /// Correlation id, also written to the logs
        id: u32,
        /// When the error happened
        utc_time: DateTime<Utc>,
    },
}

impl ApiError {
    /// Create a client input error
    pub fn client_input(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self::ClientInput {
            status,
            code,
            message: message.into(),
        }
    }

    /// Create a server error with a fresh correlation id
    pub fn server(code: &'static str, area: impl Into<String>) -> Self {
        Self::Server {
            code,
            area: area.into(),
            id: rand::rng().random_range(MIN_ERROR_ID..=MAX_ERROR_ID),
            utc_time: Utc::now(),
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClientInput { status, .. } => *status,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code sent to the caller
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClientInput { code, .. } | Self::Server { code, .. } => *code,
            Self::Unauthorized => codes::UNAUTHORIZED,
        }
    }

    /// Correlation id for server errors
    #[must_use]
    pub fn error_id(&self) -> Option<u32> {
        match self {
            Self::Server { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Build the JSON error body
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Self::ClientInput { code, message, .. } => ErrorBody {
                code: *code,
                message: message.clone(),
                area: None,
                id: None,
                utc_time: None,
            },
            Self::Unauthorized => ErrorBody {
                code: codes::UNAUTHORIZED,
                message: "Missing, invalid or expired access token".to_string(),
                area: None,
                id: None,
                utc_time: None,
            },
            Self::Server {
                code,
                area,
                id,
                utc_time,
            } => ErrorBody {
                code: *code,
                message: "Problem encountered in the API".to_string(),
                area: Some(area.clone()),
                id: Some(*id),
                utc_time: Some(utc_time.to_rfc3339_opts(SecondsFormat::Millis, true)),
            },
        }
    }
}

/// JSON error body
///
/// `area`, `id` and `utcTime` are only present on 5xx responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Error code
    pub code: &'static str,
    /// Human readable message
    pub message: String,
    /// Error area (API name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Correlation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// ISO-8601 UTC timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_time: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.to_body())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
