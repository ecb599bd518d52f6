//! API-key authentication.
//!
//! Tenant descriptors are folded into an immutable key → principal map
//! at startup. The map is never mutated afterwards, so lookups need no
//! locking.

use axum::http::{header, HeaderMap};
use std::collections::{HashMap, HashSet};

use crate::config::TeamConfig;

/// An authenticated caller and its allowances. Immutable for the
/// lifetime of the process; cheap to clone per request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub tenant: String,
    pub allowed_models: HashSet<String>,
    pub requests_per_minute: u32,
    pub monthly_budget_usd: f64,
}

/// Why authentication failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
}

impl AuthError {
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::InvalidApiKey => "invalid_api_key",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing api key",
            Self::InvalidApiKey => "invalid api key",
        }
    }
}

/// Read-only API-key lookup table.
pub struct Authenticator {
    by_key: HashMap<String, Principal>,
}

impl Authenticator {
    pub fn new(teams: &[TeamConfig]) -> Self {
        let mut by_key = HashMap::with_capacity(teams.len());
        for team in teams {
            by_key.insert(
                team.api_key.clone(),
                Principal {
                    tenant: team.name.clone(),
                    allowed_models: team.allowed_models.iter().cloned().collect(),
                    requests_per_minute: team.requests_per_minute,
                    monthly_budget_usd: team.monthly_budget_usd,
                },
            );
        }
        Self { by_key }
    }

    /// Resolve the caller from `X-API-Key`, falling back to a bearer
    /// `Authorization` header. The `Bearer` prefix is matched
    /// case-insensitively; the key itself keeps its case.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let key = extract_api_key(headers);
        if key.is_empty() {
            return Err(AuthError::MissingApiKey);
        }
        self.by_key
            .get(key)
            .cloned()
            .ok_or(AuthError::InvalidApiKey)
    }
}

fn extract_api_key(headers: &HeaderMap) -> &str {
    if let Some(key) = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return key;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .and_then(strip_bearer)
        .unwrap_or("")
}

fn strip_bearer(value: &str) -> Option<&str> {
    let prefix = value.get(..7)?;
    if prefix.eq_ignore_ascii_case("bearer ") {
        Some(value[7..].trim())
    } else {
        None
    }
}
