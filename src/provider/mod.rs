//! Provider adapters - wire-level clients for each LLM backend kind
//!
//! An adapter knows one protocol and nothing else: it never tracks which
//! models are loaded (that belongs to the fleet manager) and every operation
//! runs under a caller-supplied deadline.

pub mod ollama;
pub mod openai_chat;
pub mod openai_completions;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{FleetError, FleetResult};

pub use ollama::OllamaAdapter;
pub use openai_chat::OpenAiChatAdapter;
pub use openai_completions::OpenAiCompletionsAdapter;

/// A model id as reported by a provider listing, with the size when the
/// protocol reports one (Ollama does, the OpenAI-style listings do not).
#[derive(Debug, Clone)]
pub struct DiscoveredModel {
    pub id: String,
    pub size_bytes: Option<u64>,
}

/// Tunables for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub content: String,
    pub elapsed_ms: u64,
}

/// Result of a minimal liveness generation (`max_tokens = 1`, temperature 0).
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// List model ids the provider currently serves. Failure means the
    /// provider is offline; callers must treat that as non-fatal.
    async fn list_models(&self, deadline: Duration) -> FleetResult<Vec<DiscoveredModel>>;

    /// Minimal generation asserting the model answers right now.
    async fn probe(&self, model_id: &str, deadline: Duration) -> FleetResult<ProbeOutcome>;

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: GenerationParams,
        deadline: Duration,
    ) -> FleetResult<GenerationOutput>;

    /// Ask the provider to load a model. Only meaningful where the protocol
    /// supports it; the default is the manual-load path.
    async fn load(&self, model_id: &str, _deadline: Duration) -> FleetResult<()> {
        Err(FleetError::ManualLoadRequired {
            provider: self.name().to_string(),
            model: model_id.to_string(),
        })
    }

    /// Ask the provider to unload a model. Default: not supported over the wire.
    async fn unload(&self, model_id: &str, _deadline: Duration) -> FleetResult<()> {
        Err(FleetError::unavailable(
            self.name(),
            format!("programmatic unload of '{model_id}' not supported"),
        ))
    }
}

/// Construct the adapter matching a provider's configured kind, applying any
/// endpoint path overrides from the configuration.
pub fn adapter_for(
    name: &str,
    config: &ProviderConfig,
    client: reqwest::Client,
) -> Arc<dyn ProviderAdapter> {
    let endpoints = &config.endpoints;
    match config.kind {
        ProviderKind::OpenaiChat => Arc::new(
            OpenAiChatAdapter::new(name, &config.base_url, client)
                .with_paths(endpoints.models.clone(), endpoints.chat.clone()),
        ),
        ProviderKind::OllamaNative => Arc::new(
            OllamaAdapter::new(name, &config.base_url, client).with_paths(
                endpoints.models.clone(),
                endpoints.generate.clone(),
                endpoints.load.clone(),
            ),
        ),
        ProviderKind::OpenaiCompletions => Arc::new(
            OpenAiCompletionsAdapter::new(name, &config.base_url, client).with_paths(
                endpoints.models.clone(),
                endpoints.generate.clone().or_else(|| endpoints.chat.clone()),
            ),
        ),
    }
}

/// Run `fut` under `deadline`, mapping expiry to [`FleetError::Timeout`].
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> FleetResult<T>
where
    F: Future<Output = FleetResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::Timeout(deadline.as_millis())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let result: FleetResult<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(FleetError::Timeout(10))));
    }

    #[test]
    fn test_adapter_for_matches_kind() {
        let client = reqwest::Client::new();
        let config = ProviderConfig {
            base_url: "http://localhost:8000".to_string(),
            kind: ProviderKind::OpenaiCompletions,
            enabled: true,
            can_load: false,
            can_unload: false,
            max_concurrent_models: 1,
            memory_limit_gb: 6,
            endpoints: Default::default(),
        };
        let adapter = adapter_for("vllm", &config, client);
        assert_eq!(adapter.kind(), ProviderKind::OpenaiCompletions);
        assert_eq!(adapter.name(), "vllm");
    }
}
