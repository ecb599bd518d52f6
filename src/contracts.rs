//! Wire types for the gateway API.
//!
//! Field names are the external contract; internal code says "tenant"
//! while the wire keeps the team vocabulary callers already script
//! against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /v1/gateway/completions`. Unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub input: String,
}

/// Successful completion payload.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub request_id: String,
    pub team: String,
    pub model: String,
    pub output: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub policy_decision: String,
    pub processed_at: DateTime<Utc>,
}

/// Error envelope used by every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

/// Current usage and budget state for the calling tenant.
#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub team: String,
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_usd: f64,
    pub monthly_budget_usd: f64,
    pub remaining_budget_usd: f64,
    pub per_model_cost_usd: HashMap<String, f64>,
}

/// Scrubbed audit record returned by `GET /v1/audit`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEventView {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub team: String,
    pub model: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
    pub redacted_input: String,
    pub cost_usd: f64,
    pub latency_ms: i64,
}
