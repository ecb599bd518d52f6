//! Upstream model integrations.
//!
//! A provider is a single-method capability: given a model and input
//! text, produce output text or fail. Concrete integrations are chosen
//! at startup and threaded through the pipeline as `Arc<dyn ModelClient>`.

use async_trait::async_trait;

/// Abstraction over an LLM provider backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, model: &str, input: &str) -> anyhow::Result<String>;
}

/// Deterministic local responses for demos and tests.
pub struct SimulatedModelClient;

#[async_trait]
impl ModelClient for SimulatedModelClient {
    async fn complete(&self, model: &str, input: &str) -> anyhow::Result<String> {
        let mut normalized = input.trim().to_owned();
        if normalized.chars().count() > 180 {
            normalized = normalized.chars().take(180).collect::<String>() + "...";
        }
        Ok(format!(
            "[{model}] triage summary: request accepted; key risks extracted from input: {normalized}"
        ))
    }
}
