//! Usage accounting and budget enforcement.
//!
//! Keeps an in-memory ledger of per-tenant token and cost counters plus
//! the pricing table. All state is process-local and volatile; a single
//! lock guards both maps so budget checks and charges are linearized per
//! tenant.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Fallback USD price per 1K tokens for models absent from the table.
const DEFAULT_PRICE_PER_1K_USD: f64 = 0.005;

/// Aggregated billing counters for one tenant.
#[derive(Debug, Clone, Default)]
pub struct TenantUsage {
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_usd: f64,
    pub per_model_cost_usd: HashMap<String, f64>,
}

struct Inner {
    pricing: HashMap<String, f64>,
    usage: HashMap<String, TenantUsage>,
}

/// In-memory billing ledger.
pub struct BillingLedger {
    inner: Mutex<Inner>,
}

/// Approximate a token count as one token per four characters of the
/// trimmed text, with a floor of one for any non-empty input.
pub fn approx_tokens(s: &str) -> i64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let chars = trimmed.chars().count();
    (chars.div_ceil(4)).max(1) as i64
}

impl BillingLedger {
    pub fn new(pricing: HashMap<String, f64>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pricing,
                usage: HashMap::new(),
            }),
        }
    }

    /// USD per 1K tokens for the model; unknown models get the default
    /// price per call, nothing is stored.
    pub fn unit_price(&self, model: &str) -> f64 {
        self.inner
            .lock()
            .pricing
            .get(model)
            .copied()
            .unwrap_or(DEFAULT_PRICE_PER_1K_USD)
    }

    pub fn estimate_cost(&self, model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
        (input_tokens + output_tokens) as f64 / 1000.0 * self.unit_price(model)
    }

    /// Budget left this month, floored at zero.
    pub fn remaining_budget(&self, tenant: &str, monthly_budget_usd: f64) -> f64 {
        let spent = self
            .inner
            .lock()
            .usage
            .get(tenant)
            .map_or(0.0, |u| u.total_cost_usd);
        (monthly_budget_usd - spent).max(0.0)
    }

    pub fn can_afford(&self, tenant: &str, monthly_budget_usd: f64, estimated_cost: f64) -> bool {
        self.remaining_budget(tenant, monthly_budget_usd) >= estimated_cost
    }

    /// Charge one completed request against the tenant's counters.
    pub fn record(&self, tenant: &str, model: &str, input_tokens: i64, output_tokens: i64, cost: f64) {
        let mut inner = self.inner.lock();
        let usage = inner.usage.entry(tenant.to_owned()).or_default();
        usage.total_requests += 1;
        usage.total_input_tokens += input_tokens;
        usage.total_output_tokens += output_tokens;
        usage.total_cost_usd += cost;
        *usage.per_model_cost_usd.entry(model.to_owned()).or_insert(0.0) += cost;
    }

    /// Snapshot of the tenant's counters. The per-model map is a deep
    /// copy so callers never alias ledger state.
    pub fn get_usage(&self, tenant: &str) -> TenantUsage {
        self.inner
            .lock()
            .usage
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }
}
