//! HTTP router

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::StatusCode, middleware, routing::get};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::auth::auth_middleware;
use super::handlers::{
    CompanyRepository, companies_handler, company_handler, health_handler, userinfo_handler,
};
use crate::authorizer::Authorizer;

/// Shared application state
pub struct AppState {
    /// Request authorizer
    pub authorizer: Arc<Authorizer>,
    /// Sample data
    pub companies: CompanyRepository,
}

/// Create the router. `/health` is public, everything under `/api` needs a
/// valid access token.
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let authorizer = Arc::clone(&state.authorizer);

    let api = Router::new()
        .route("/api/userinfo", get(userinfo_handler))
        .route("/api/companies", get(companies_handler))
        .route("/api/companies/{id}", get(company_handler))
        .layer(middleware::from_fn_with_state(authorizer, auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
