//! Authorization middleware
//!
//! Runs the [`Authorizer`] for every protected route. Allowed requests get
//! their [`ApiClaims`](crate::claims::ApiClaims) inserted into the request
//! extensions; denied requests are answered here and never reach a handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::authorizer::{AuthDecision, Authorizer};

/// Authorization middleware
pub async fn auth_middleware(
    State(authorizer): State<Arc<Authorizer>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authorizer.authorize(request.headers()).await {
        AuthDecision::Allow(claims) => {
            debug!(subject = %claims.subject(), path = %request.uri().path(), "Authorized");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        AuthDecision::Deny(error) => error.into_response(),
    }
}
