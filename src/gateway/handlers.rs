//! Sample API handlers
//!
//! A small investments API whose data access is scoped by the caller's
//! `regions` custom claim. Companies outside those regions are reported as
//! not found rather than forbidden.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::{Value, json};

use super::router::AppState;
use crate::claims::ApiClaims;
use crate::error::{ApiError, codes};

/// A company seeking investment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// Numeric id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Region the company trades in
    pub region: String,
    /// Funding target
    pub target_usd: u64,
    /// Funding raised so far
    pub investment_usd: u64,
    /// Number of investors
    pub number_of_investors: u32,
}

/// Read-only company store
#[derive(Debug, Clone)]
pub struct CompanyRepository {
    companies: Vec<Company>,
}

impl CompanyRepository {
    /// Store holding the given companies
    #[must_use]
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    /// Companies visible to a caller with these regions
    #[must_use]
    pub fn for_regions(&self, regions: &[String]) -> Vec<Company> {
        self.companies
            .iter()
            .filter(|c| regions.iter().any(|r| r == &c.region))
            .cloned()
            .collect()
    }

    /// A single company, if visible with these regions
    #[must_use]
    pub fn find(&self, id: i64, regions: &[String]) -> Option<Company> {
        self.companies
            .iter()
            .find(|c| c.id == id && regions.iter().any(|r| r == &c.region))
            .cloned()
    }
}

impl Default for CompanyRepository {
    fn default() -> Self {
        let company = |id, name: &str, region: &str, target_usd, investment_usd, number_of_investors| Company {
            id,
            name: name.to_string(),
            region: region.to_string(),
            target_usd,
            investment_usd,
            number_of_investors,
        };

        Self::new(vec![
            company(1, "Company 1", "Europe", 40_000, 20_000, 10),
            company(2, "Company 2", "USA", 100_000, 60_000, 20),
            company(3, "Company 3", "USA", 20_000, 15_000, 5),
            company(4, "Company 4", "Asia", 50_000, 10_000, 8),
        ])
    }
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/userinfo
pub async fn userinfo_handler(Extension(claims): Extension<ApiClaims>) -> Json<Value> {
    let user_info = claims.user_info();
    Json(json!({
        "givenName": user_info.given_name,
        "familyName": user_info.family_name,
        "regions": claims.regions(),
    }))
}

/// GET /api/companies
pub async fn companies_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<ApiClaims>,
) -> Json<Vec<Company>> {
    Json(state.companies.for_regions(&claims.regions()))
}

/// GET /api/companies/{id}
pub async fn company_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<ApiClaims>,
    Path(id): Path<String>,
) -> Result<Json<Company>, ApiError> {
    let id = parse_company_id(&id)?;

    state
        .companies
        .find(id, &claims.regions())
        .map(Json)
        .ok_or_else(|| {
            ApiError::client_input(
                StatusCode::NOT_FOUND,
                codes::COMPANY_NOT_FOUND,
                format!("Company {id} was not found for this user"),
            )
        })
}

fn parse_company_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().ok().filter(|id| *id > 0).ok_or_else(|| {
        ApiError::client_input(
            StatusCode::BAD_REQUEST,
            codes::INVALID_COMPANY_ID,
            "The company id must be a positive integer",
        )
    })
}
