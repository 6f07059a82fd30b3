//! Claims model
//!
//! [`ApiClaims`] is what downstream authorization decisions run against. It is
//! composed once per token from three sources and then only ever replaced,
//! never mutated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims taken from the validated access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseClaims {
    /// `sub` claim
    pub subject: String,
    /// Granted scopes
    pub scopes: BTreeSet<String>,
    /// `exp` claim, unix seconds
    pub expiry: i64,
}

impl BaseClaims {
    /// Check whether a scope was granted
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Identity claims from the authorization server's user-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoClaims {
    /// `given_name`
    #[serde(default)]
    pub given_name: String,
    /// `family_name`
    #[serde(default)]
    pub family_name: String,
    /// `email`
    #[serde(default)]
    pub email: String,
}

/// Domain-specific claims supplied by the integrating application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomClaims(Map<String, Value>);

impl CustomClaims {
    /// Empty custom claims
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Raw claim value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A claim holding a string
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// A claim holding an array of strings; non-string items are ignored
    #[must_use]
    pub fn string_list(&self, name: &str) -> Vec<String> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if no custom claims were supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The fully resolved claims for one access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClaims {
    base: BaseClaims,
    user_info: UserInfoClaims,
    custom: CustomClaims,
}

impl ApiClaims {
    pub(crate) fn new(base: BaseClaims, user_info: UserInfoClaims, custom: CustomClaims) -> Self {
        Self {
            base,
            user_info,
            custom,
        }
    }

    /// Token subject
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.base.subject
    }

    /// Token expiry, unix seconds
    #[must_use]
    pub fn expiry(&self) -> i64 {
        self.base.expiry
    }

    /// Token claims
    #[must_use]
    pub fn base(&self) -> &BaseClaims {
        &self.base
    }

    /// User-info claims
    #[must_use]
    pub fn user_info(&self) -> &UserInfoClaims {
        &self.user_info
    }

    /// Custom claims
    #[must_use]
    pub fn custom(&self) -> &CustomClaims {
        &self.custom
    }

    /// Regions this subject may act in, from the `regions` custom claim
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        self.custom.string_list("regions")
    }
}
