//! Operational telemetry for the gateway.
//!
//! Four labeled families on a per-instance registry, rendered in
//! Prometheus text format by the `/metrics` endpoint. The request
//! counter and latency histogram are emitted exactly once per request,
//! whichever branch terminates it.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Labeled counters and histograms for gateway traffic.
pub struct MetricsSink {
    registry: Registry,
    pub(crate) requests_total: CounterVec,
    pub(crate) latency_seconds: HistogramVec,
    pub(crate) tokens_total: CounterVec,
    pub(crate) cost_usd_total: CounterVec,
}

impl MetricsSink {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("requests_total", "Total requests processed by the gateway."),
            &["tenant", "model", "status"],
        )?;
        let latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "request_latency_seconds",
                "Latency distribution for gateway requests.",
            ),
            &["tenant", "model", "status"],
        )?;
        let tokens_total = CounterVec::new(
            Opts::new("tokens_total", "Token usage grouped by tenant/model/type."),
            &["tenant", "model", "type"],
        )?;
        let cost_usd_total = CounterVec::new(
            Opts::new("cost_usd_total", "Accumulated completion cost (USD)."),
            &["tenant", "model"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(latency_seconds.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            latency_seconds,
            tokens_total,
            cost_usd_total,
        })
    }

    /// One request reached its terminal state.
    pub fn observe_request(&self, tenant: &str, model: &str, status: &str, latency_secs: f64) {
        self.requests_total
            .with_label_values(&[tenant, model, status])
            .inc();
        self.latency_seconds
            .with_label_values(&[tenant, model, status])
            .observe(latency_secs);
    }

    pub fn add_tokens(&self, tenant: &str, model: &str, kind: &str, tokens: i64) {
        if tokens > 0 {
            self.tokens_total
                .with_label_values(&[tenant, model, kind])
                .inc_by(tokens as f64);
        }
    }

    pub fn add_cost(&self, tenant: &str, model: &str, cost_usd: f64) {
        if cost_usd > 0.0 {
            self.cost_usd_total
                .with_label_values(&[tenant, model])
                .inc_by(cost_usd);
        }
    }

    /// Render everything collected so far in Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
