//! Request policy evaluation.
//!
//! A request is admitted only when the tenant is entitled to the model
//! and the raw prompt matches none of the configured deny patterns.
//! Evaluation is stateless and safe to share across requests.

use regex::Regex;
use std::collections::HashSet;

/// Why a request was denied by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The requested model is not on the tenant's allow-list.
    ModelNotAllowed,
    /// The prompt matched one of the deny patterns.
    BlockedPattern,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelNotAllowed => "model_not_allowed_for_team",
            Self::BlockedPattern => "blocked_pattern_detected",
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(DenyReason),
}

/// Evaluation context for one request.
#[derive(Debug)]
pub struct PolicyInput<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub allowed_models: &'a HashSet<String>,
}

/// Compiled deny-pattern list plus the model allow-list check.
pub struct PolicyEngine {
    blocked: Vec<Regex>,
}

impl PolicyEngine {
    /// Compile the configured deny patterns. Patterns that fail to
    /// compile are skipped with a warning so a single bad entry cannot
    /// take the gateway down.
    pub fn new(patterns: &[String]) -> Self {
        let mut blocked = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match Regex::new(pattern) {
                Ok(re) => blocked.push(re),
                Err(err) => {
                    tracing::warn!(pattern = %pattern, %err, "discarding deny pattern that failed to compile");
                }
            }
        }
        Self { blocked }
    }

    /// The model membership check runs first; pattern checks run against
    /// the raw (non-redacted) prompt in configuration order.
    pub fn evaluate(&self, input: PolicyInput<'_>) -> PolicyDecision {
        if !input.allowed_models.contains(input.model) {
            return PolicyDecision::Deny(DenyReason::ModelNotAllowed);
        }
        for re in &self.blocked {
            if re.is_match(input.prompt) {
                return PolicyDecision::Deny(DenyReason::BlockedPattern);
            }
        }
        PolicyDecision::Allow
    }
}
