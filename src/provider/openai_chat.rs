//! OpenAI-chat-style adapter (LM Studio and compatible servers)
//!
//! `GET /v1/models` for discovery, `POST /v1/chat/completions` with a
//! messages array for probes and generations.

use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};

use super::{with_deadline, DiscoveredModel, GenerationOutput, GenerationParams, ProbeOutcome};
use crate::config::ProviderKind;
use crate::error::{FleetError, FleetResult};
use crate::provider::ProviderAdapter;

pub struct OpenAiChatAdapter {
    name: String,
    base_url: String,
    models_path: String,
    chat_path: String,
    client: reqwest::Client,
}

impl OpenAiChatAdapter {
    pub fn new(name: impl Into<String>, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            models_path: "/v1/models".to_string(),
            chat_path: "/v1/chat/completions".to_string(),
            client,
        }
    }

    pub fn with_paths(mut self, models: Option<String>, chat: Option<String>) -> Self {
        if let Some(models) = models {
            self.models_path = models;
        }
        if let Some(chat) = chat {
            self.chat_path = chat;
        }
        self
    }

    async fn chat_completion(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> FleetResult<String> {
        let body = json!({
            "model": model_id,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let res = self
            .client
            .post(format!("{}{}", self.base_url, self.chat_path))
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::unavailable(&self.name, e))?;

        if !res.status().is_success() {
            return Err(FleetError::unavailable(
                &self.name,
                format!("chat completion returned {}", res.status()),
            ));
        }

        let payload: serde_json::Value = res
            .json()
            .await
            .map_err(|e| FleetError::malformed(&self.name, e.to_string()))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| FleetError::malformed(&self.name, "missing choices[0].message.content"))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiChatAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiChat
    }

    async fn list_models(&self, deadline: Duration) -> FleetResult<Vec<DiscoveredModel>> {
        with_deadline(deadline, async {
            let res = self
                .client
                .get(format!("{}{}", self.base_url, self.models_path))
                .send()
                .await
                .map_err(|e| FleetError::unavailable(&self.name, e))?;

            if !res.status().is_success() {
                return Err(FleetError::unavailable(
                    &self.name,
                    format!("model listing returned {}", res.status()),
                ));
            }

            let payload: serde_json::Value = res
                .json()
                .await
                .map_err(|e| FleetError::malformed(&self.name, e.to_string()))?;

            let data = payload["data"]
                .as_array()
                .ok_or_else(|| FleetError::malformed(&self.name, "missing data array"))?;

            Ok(data
                .iter()
                .filter_map(|m| m["id"].as_str())
                .map(|id| DiscoveredModel {
                    id: id.to_string(),
                    size_bytes: None,
                })
                .collect())
        })
        .await
    }

    async fn probe(&self, model_id: &str, deadline: Duration) -> FleetResult<ProbeOutcome> {
        let started = Instant::now();
        with_deadline(deadline, self.chat_completion(model_id, "Hi", 0.0, 1)).await?;
        Ok(ProbeOutcome {
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        params: GenerationParams,
        deadline: Duration,
    ) -> FleetResult<GenerationOutput> {
        let started = Instant::now();
        let content = with_deadline(
            deadline,
            self.chat_completion(model_id, prompt, params.temperature, params.max_tokens),
        )
        .await?;
        Ok(GenerationOutput {
            content,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}
