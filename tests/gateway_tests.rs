//! Router tests for the sample API behind the authorization middleware

mod common;

use std::sync::Arc;
use std::time::Duration;

use api_authorizer::gateway::{AppState, CompanyRepository, create_router};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use common::{MockAuthServer, valid_token};

async fn router(auth: &MockAuthServer) -> Router {
    let mut config = auth.config();
    config.custom_claims.enabled = true;
    let state = Arc::new(AppState {
        authorizer: Arc::new(auth.authorizer(&config)),
        companies: CompanyRepository::default(),
    });
    create_router(state, Duration::from_secs(5))
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(0).await;

    let response = router(&auth).await.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn api_without_token_is_401_with_challenge() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(0).await;

    let response = router(&auth)
        .await
        .oneshot(get("/api/companies", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert!(body.get("id").is_none());
}

#[tokio::test]
async fn userinfo_returns_composed_claims() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(1).await;
    auth.serve_user_info(1).await;

    let response = router(&auth)
        .await
        .oneshot(get("/api/userinfo", Some(&valid_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["givenName"], "Guest");
    assert_eq!(body["familyName"], "User");
    assert_eq!(body["regions"], serde_json::json!(["USA"]));
}

#[tokio::test]
async fn companies_are_filtered_by_region() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(1).await;
    auth.serve_user_info(1).await;

    let response = router(&auth)
        .await
        .oneshot(get("/api/companies", Some(&valid_token())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let regions: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["region"].as_str().unwrap())
        .collect();
    assert_eq!(regions, vec!["USA", "USA"]);
}

#[tokio::test]
async fn company_lookup_respects_region_and_id_rules() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(1).await;
    auth.serve_user_info(1).await;
    let app = router(&auth).await;
    let token = valid_token();

    // visible
    let response = app
        .clone()
        .oneshot(get("/api/companies/2", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "Company 2");

    // other region
    let response = app
        .clone()
        .oneshot(get("/api/companies/1", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "company_not_found");

    // not a positive integer
    let response = app
        .oneshot(get("/api/companies/abc", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "invalid_company_id");
}

#[tokio::test]
async fn simulated_exception_is_500_with_correlation_id() {
    let auth = MockAuthServer::start().await;
    auth.serve_jwks(1).await;
    auth.serve_user_info(1).await;

    let request = Request::builder()
        .uri("/api/companies")
        .header(header::AUTHORIZATION, format!("Bearer {}", valid_token()))
        .header("x-mycompany-test-exception", "SampleApi")
        .body(Body::empty())
        .unwrap();
    let response = router(&auth).await.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "exception_simulation");
    assert_eq!(body["area"], "SampleApi");
    assert!(body["id"].is_u64());
    assert!(body["utcTime"].is_string());
}
