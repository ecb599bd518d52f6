//! Demo model-routing decisions.
//!
//! Picks a latency- or quality-optimized model for a request unless the
//! tenant's token budget is already spent. Stateless; served by the
//! standalone `router` demo binary.

use serde::{Deserialize, Serialize};

/// A routing request from a tenant workload.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub tenant: String,
    /// "latency" or "quality".
    #[serde(default)]
    pub task_class: String,
    #[serde(default)]
    pub estimated_tokens: i64,
}

/// Token budget state for a tenant.
#[derive(Debug, Clone, Copy)]
pub struct TenantTokenBudget {
    pub monthly_token_limit: i64,
    pub used_tokens: i64,
}

/// The chosen provider/model, or a denial with its reason.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteDecision {
    pub provider: String,
    pub model: String,
    pub allowed: bool,
    pub reason: String,
}

/// Route a request within the tenant's token budget.
pub fn decide(req: &RouteRequest, budget: TenantTokenBudget) -> RouteDecision {
    if budget.used_tokens + req.estimated_tokens > budget.monthly_token_limit {
        return RouteDecision {
            provider: String::new(),
            model: String::new(),
            allowed: false,
            reason: "budget_exceeded".into(),
        };
    }
    if req.task_class == "quality" {
        return RouteDecision {
            provider: "openai".into(),
            model: "gpt-5".into(),
            allowed: true,
            reason: "quality_path".into(),
        };
    }
    RouteDecision {
        provider: "openai".into(),
        model: "gpt-5-mini".into(),
        allowed: true,
        reason: "latency_path".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_route() {
        let req = RouteRequest {
            tenant: "t1".into(),
            task_class: "quality".into(),
            estimated_tokens: 1000,
        };
        let budget = TenantTokenBudget {
            monthly_token_limit: 10_000,
            used_tokens: 100,
        };
        let decision = decide(&req, budget);
        assert!(decision.allowed);
        assert_eq!(decision.model, "gpt-5");
    }

    #[test]
    fn latency_route_is_the_default() {
        let req = RouteRequest {
            tenant: "t1".into(),
            task_class: String::new(),
            estimated_tokens: 10,
        };
        let budget = TenantTokenBudget {
            monthly_token_limit: 1000,
            used_tokens: 0,
        };
        let decision = decide(&req, budget);
        assert!(decision.allowed);
        assert_eq!(decision.model, "gpt-5-mini");
        assert_eq!(decision.reason, "latency_path");
    }

    #[test]
    fn budget_exceeded() {
        let req = RouteRequest {
            tenant: "t1".into(),
            task_class: "latency".into(),
            estimated_tokens: 5000,
        };
        let budget = TenantTokenBudget {
            monthly_token_limit: 5000,
            used_tokens: 100,
        };
        let decision = decide(&req, budget);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "budget_exceeded");
    }
}
