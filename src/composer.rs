//! Claims composition
//!
//! [`ClaimsComposer`] joins token claims, user-info claims and
//! application-specific custom claims into one [`ApiClaims`]. The custom part
//! comes from a [`CustomClaimsSupplier`] chosen at startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::claims::{ApiClaims, BaseClaims, CustomClaims, UserInfoClaims};
use crate::config::{CustomClaimsConfig, SubjectClaimsConfig};

/// Custom claims lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CustomClaimsError {
    /// The supplier's business data could not be read
    #[error("custom claims lookup failed: {0}")]
    LookupFailed(String),
}

/// Source of domain-specific claims for a verified subject
#[async_trait]
pub trait CustomClaimsSupplier: Send + Sync {
    /// Look up custom claims for a caller
    async fn lookup(
        &self,
        base: &BaseClaims,
        user_info: &UserInfoClaims,
    ) -> Result<CustomClaims, CustomClaimsError>;
}

/// Supplies no custom claims
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCustomClaimsSupplier;

#[async_trait]
impl CustomClaimsSupplier for EmptyCustomClaimsSupplier {
    async fn lookup(
        &self,
        _base: &BaseClaims,
        _user_info: &UserInfoClaims,
    ) -> Result<CustomClaims, CustomClaimsError> {
        Ok(CustomClaims::new())
    }
}

/// Supplies `user_role` and `regions` from a subject table, with defaults
/// for subjects not in the table.
#[derive(Debug, Clone)]
pub struct RegionClaimsSupplier {
    subjects: HashMap<String, SubjectClaimsConfig>,
    default_role: String,
    default_regions: Vec<String>,
}

impl RegionClaimsSupplier {
    /// Build from configuration
    #[must_use]
    pub fn from_config(config: &CustomClaimsConfig) -> Self {
        Self {
            subjects: config.subjects.clone(),
            default_role: config.default_role.clone(),
            default_regions: config.default_regions.clone(),
        }
    }
}

#[async_trait]
impl CustomClaimsSupplier for RegionClaimsSupplier {
    async fn lookup(
        &self,
        base: &BaseClaims,
        _user_info: &UserInfoClaims,
    ) -> Result<CustomClaims, CustomClaimsError> {
        let (role, regions) = self.subjects.get(&base.subject).map_or_else(
            || (self.default_role.clone(), self.default_regions.clone()),
            |entry| (entry.role.clone(), entry.regions.clone()),
        );

        Ok(CustomClaims::new()
            .with("user_role", role)
            .with("regions", regions))
    }
}

/// Builds [`ApiClaims`] from its three sources
#[derive(Clone)]
pub struct ClaimsComposer {
    supplier: Arc<dyn CustomClaimsSupplier>,
}

impl ClaimsComposer {
    /// Use the given custom claims supplier
    #[must_use]
    pub fn new(supplier: Arc<dyn CustomClaimsSupplier>) -> Self {
        Self { supplier }
    }

    /// The supplier configured for this deployment
    #[must_use]
    pub fn from_config(config: &CustomClaimsConfig) -> Self {
        if config.enabled {
            Self::new(Arc::new(RegionClaimsSupplier::from_config(config)))
        } else {
            Self::new(Arc::new(EmptyCustomClaimsSupplier))
        }
    }

    /// Ask the supplier for custom claims
    ///
    /// # Errors
    ///
    /// Propagates the supplier's failure.
    pub async fn custom_claims(
        &self,
        base: &BaseClaims,
        user_info: &UserInfoClaims,
    ) -> Result<CustomClaims, CustomClaimsError> {
        self.supplier.lookup(base, user_info).await
    }

    /// Merge the three claim sources
    #[must_use]
    pub fn compose(base: BaseClaims, user_info: UserInfoClaims, custom: CustomClaims) -> ApiClaims {
        ApiClaims::new(base, user_info, custom)
    }
}

impl Default for ClaimsComposer {
    fn default() -> Self {
        Self::new(Arc::new(EmptyCustomClaimsSupplier))
    }
}
