//! Runtime gateway configuration.
//!
//! A safe local-first default with demo tenants, overridable through
//! environment variables. Config is read once at startup; invalid JSON
//! overrides are logged and ignored rather than failing the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upstream call bound when the env override is absent.
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Tenant-specific gateway limits and permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub api_key: String,
    pub allowed_models: Vec<String>,
    pub requests_per_minute: u32,
    pub monthly_budget_usd: f64,
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub default_model: String,
    pub max_audit_events: i64,
    pub blocked_patterns: Vec<String>,
    pub pricing_per_1k_usd: HashMap<String, f64>,
    pub teams: Vec<TeamConfig>,
    pub upstream_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            default_model: "gpt-4o-mini".into(),
            max_audit_events: 5000,
            blocked_patterns: vec![
                r"(?i)ignore\s+all\s+previous\s+instructions".into(),
                r"(?i)reveal\s+system\s+prompt".into(),
                r"(?i)exfiltrate\s+secrets?".into(),
                r"(?i)bypass\s+policy".into(),
            ],
            pricing_per_1k_usd: HashMap::from([
                ("gpt-4o-mini".to_string(), 0.0030),
                ("gpt-4.1-mini".to_string(), 0.0045),
                ("claude-3-5-sonnet".to_string(), 0.0060),
            ]),
            teams: vec![
                TeamConfig {
                    name: "red-team".into(),
                    api_key: "demo-red-key".into(),
                    allowed_models: vec!["gpt-4o-mini".into(), "gpt-4.1-mini".into()],
                    requests_per_minute: 60,
                    monthly_budget_usd: 75.0,
                },
                TeamConfig {
                    name: "blue-team".into(),
                    api_key: "demo-blue-key".into(),
                    allowed_models: vec!["gpt-4o-mini".into(), "claude-3-5-sonnet".into()],
                    requests_per_minute: 30,
                    monthly_budget_usd: 40.0,
                },
            ],
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Environment-overridden configuration. `GATEWAY_TEAMS_JSON` and
    /// `GATEWAY_PRICING_JSON` allow full replacement of the tenant
    /// roster and the pricing table.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = non_empty_env("GATEWAY_LISTEN_ADDR") {
            cfg.listen_addr = v;
        }
        if let Some(v) = non_empty_env("GATEWAY_DEFAULT_MODEL") {
            cfg.default_model = v;
        }
        if let Some(v) = non_empty_env("GATEWAY_MAX_AUDIT_EVENTS") {
            match v.parse::<i64>() {
                Ok(n) if n > 0 => cfg.max_audit_events = n,
                _ => tracing::warn!(value = %v, "invalid GATEWAY_MAX_AUDIT_EVENTS, using default"),
            }
        }
        if let Some(v) = non_empty_env("GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => cfg.upstream_timeout_secs = n,
                _ => tracing::warn!(value = %v, "invalid GATEWAY_UPSTREAM_TIMEOUT_SECS, using default"),
            }
        }
        if let Some(v) = non_empty_env("GATEWAY_TEAMS_JSON") {
            match serde_json::from_str::<Vec<TeamConfig>>(&v) {
                Ok(teams) if !teams.is_empty() => cfg.teams = teams,
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "invalid GATEWAY_TEAMS_JSON, using defaults"),
            }
        }
        if let Some(v) = non_empty_env("GATEWAY_PRICING_JSON") {
            match serde_json::from_str::<HashMap<String, f64>>(&v) {
                Ok(pricing) if !pricing.is_empty() => cfg.pricing_per_1k_usd = pricing,
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "invalid GATEWAY_PRICING_JSON, using defaults"),
            }
        }

        cfg
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
