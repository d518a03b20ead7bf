//! Ollama-native adapter
//!
//! `GET /api/tags` for discovery (which also reports model sizes),
//! `POST /api/generate` for probes and generations, `POST /api/pull` to
//! load. Unloading rides the same generate endpoint with `keep_alive: 0`.

use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};

use super::{with_deadline, DiscoveredModel, GenerationOutput, GenerationParams, ProbeOutcome};
use crate::config::ProviderKind;
use crate::error::{FleetError, FleetResult};
use crate::provider::ProviderAdapter;

pub struct OllamaAdapter {
    name: String,
    base_url: String,
    tags_path: String,
    generate_path: String,
    pull_path: String,
    client: reqwest::Client,
}

impl OllamaAdapter {
    pub fn new(name: impl Into<String>, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tags_path: "/api/tags".to_string(),
            generate_path: "/api/generate".to_string(),
            pull_path: "/api/pull".to_string(),
            client,
        }
    }

    pub fn with_paths(
        mut self,
        models: Option<String>,
        generate: Option<String>,
        load: Option<String>,
    ) -> Self {
        if let Some(models) = models {
            self.tags_path = models;
        }
        if let Some(generate) = generate {
            self.generate_path = generate;
        }
        if let Some(load) = load {
            self.pull_path = load;
        }
        self
    }

    async fn post_generate(&self, body: serde_json::Value) -> FleetResult<serde_json::Value> {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, self.generate_path))
            .json(&body)
            .send()
            .await
            .map_err(|e| FleetError::unavailable(&self.name, e))?;

        if !res.status().is_success() {
            return Err(FleetError::unavailable(
                &self.name,
                format!("generate returned {}", res.status()),
            ));
        }

        res.json()
            .await
            .map_err(|e| FleetError::malformed(&self.name, e.to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OllamaNative
    }

    async fn list_models(&self, deadline: Duration) -> FleetResult<Vec<DiscoveredModel>> {
        with_deadline(deadline, async {
            let res = self
                .client
                .get(format!("{}{}", self.base_url, self.tags_path))
                .send()
                .await
                .map_err(|e| FleetError::unavailable(&self.name, e))?;

            if !res.status().is_success() {
                return Err(FleetError::unavailable(
                    &self.name,
                    format!("tag listing returned {}", res.status()),
                ));
            }

            let payload: serde_json::Value = res
                .json()
                .await
                .map_err(|e| FleetError::malformed(&self.name, e.to_string()))?;

            let models = payload["models"]
                .as_array()
                .ok_or_else(|| FleetError::malformed(&self.name, "missing models array"))?;

            Ok(models
                .iter()
                .filter_map(|m| {
                    m["name"].as_str().map(|name| DiscoveredModel {
                        id: name.to_string(),
                        size_bytes: m["size"].as_u64(),
                    })
                })
                .collect())
        })
        .await
    }

    async fn probe(&self, model_id: &str, deadline: Duration) -> FleetResult<ProbeOutcome> {
        let started = Instant::now();
        let body = json!({
            "model": model_id,
            "prompt": "Hi",
            "stream": false,
            "options": { "temperature": 0.0, "num_predict": 1 },
        });
        with_deadline(deadline, self.post_generate(body)).await?;
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
        let body = json!({
            "model": model_id,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            },
        });

        let payload = with_deadline(deadline, self.post_generate(body)).await?;
        let content = payload["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| FleetError::malformed(&self.name, "missing response field"))?;

        Ok(GenerationOutput {
            content,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn load(&self, model_id: &str, deadline: Duration) -> FleetResult<()> {
        with_deadline(deadline, async {
            let res = self
                .client
                .post(format!("{}{}", self.base_url, self.pull_path))
                .json(&json!({ "name": model_id, "stream": false }))
                .send()
                .await
                .map_err(|e| FleetError::unavailable(&self.name, e))?;

            if res.status().is_success() {
                Ok(())
            } else {
                Err(FleetError::unavailable(
                    &self.name,
                    format!("pull of '{model_id}' returned {}", res.status()),
                ))
            }
        })
        .await
    }

    async fn unload(&self, model_id: &str, deadline: Duration) -> FleetResult<()> {
        // keep_alive 0 evicts the model from server memory immediately.
        let body = json!({
            "model": model_id,
            "prompt": "",
            "stream": false,
            "keep_alive": 0,
        });
        with_deadline(deadline, self.post_generate(body)).await?;
        Ok(())
    }
}
