//! Shared test doubles: an in-memory provider adapter with scriptable
//! listings, load state, and generation behavior. No network anywhere.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use agent_fleet::config::ProviderConfig;
use agent_fleet::provider::{
    DiscoveredModel, GenerationOutput, GenerationParams, ProbeOutcome, ProviderAdapter,
};
use agent_fleet::{FleetError, FleetResult, ProviderHandle, ProviderKind};

#[derive(Clone)]
pub enum GenerateBehavior {
    Succeed(String),
    TimeoutAlways,
}

pub struct MockAdapter {
    name: String,
    kind: ProviderKind,
    listed: Mutex<Vec<DiscoveredModel>>,
    loaded: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    behavior: Mutex<GenerateBehavior>,
    generation_delay: Duration,
    /// (model_id, started, finished) for every successful generation.
    generation_spans: Mutex<Vec<(String, Instant, Instant)>>,
}

impl MockAdapter {
    pub fn new(name: &str, kind: ProviderKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            listed: Mutex::new(Vec::new()),
            loaded: Mutex::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            behavior: Mutex::new(GenerateBehavior::Succeed("mock output".to_string())),
            generation_delay: Duration::ZERO,
            generation_spans: Mutex::new(Vec::new()),
        }
    }

    pub fn with_generation_delay(mut self, delay: Duration) -> Self {
        self.generation_delay = delay;
        self
    }

    pub fn set_listed(&self, models: &[(&str, Option<u64>)]) {
        let mut listed = self.listed.lock().unwrap();
        *listed = models
            .iter()
            .map(|(id, size)| DiscoveredModel {
                id: id.to_string(),
                size_bytes: *size,
            })
            .collect();
    }

    pub fn set_loaded(&self, model_id: &str, loaded: bool) {
        let mut set = self.loaded.lock().unwrap();
        if loaded {
            set.insert(model_id.to_string());
        } else {
            set.remove(model_id);
        }
    }

    pub fn loaded_ids(&self) -> HashSet<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_behavior(&self, behavior: GenerateBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn generation_spans(&self) -> Vec<(String, Instant, Instant)> {
        self.generation_spans.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn list_models(&self, _deadline: Duration) -> FleetResult<Vec<DiscoveredModel>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(FleetError::unavailable(&self.name, "listing disabled"));
        }
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn probe(&self, model_id: &str, _deadline: Duration) -> FleetResult<ProbeOutcome> {
        if self.loaded.lock().unwrap().contains(model_id) {
            Ok(ProbeOutcome { elapsed_ms: 5 })
        } else {
            Err(FleetError::unavailable(&self.name, "model not loaded"))
        }
    }

    async fn generate(
        &self,
        model_id: &str,
        _prompt: &str,
        _params: GenerationParams,
        deadline: Duration,
    ) -> FleetResult<GenerationOutput> {
        if !self.loaded.lock().unwrap().contains(model_id) {
            return Err(FleetError::unavailable(&self.name, "model not loaded"));
        }
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            GenerateBehavior::TimeoutAlways => Err(FleetError::Timeout(deadline.as_millis())),
            GenerateBehavior::Succeed(content) => {
                let started = Instant::now();
                if !self.generation_delay.is_zero() {
                    tokio::time::sleep(self.generation_delay).await;
                }
                let finished = Instant::now();
                self.generation_spans
                    .lock()
                    .unwrap()
                    .push((model_id.to_string(), started, finished));
                Ok(GenerationOutput {
                    content,
                    elapsed_ms: finished.duration_since(started).as_millis() as u64,
                })
            }
        }
    }

    async fn load(&self, model_id: &str, _deadline: Duration) -> FleetResult<()> {
        self.set_loaded(model_id, true);
        Ok(())
    }

    async fn unload(&self, model_id: &str, _deadline: Duration) -> FleetResult<()> {
        self.set_loaded(model_id, false);
        Ok(())
    }
}

/// Build a provider handle around a mock adapter.
pub fn mock_handle(
    adapter: std::sync::Arc<MockAdapter>,
    can_load: bool,
    can_unload: bool,
    max_concurrent_models: u32,
) -> ProviderHandle {
    let config = ProviderConfig {
        base_url: format!("mock://{}", adapter.name()),
        kind: adapter.kind(),
        enabled: true,
        can_load,
        can_unload,
        max_concurrent_models,
        memory_limit_gb: 6,
        endpoints: Default::default(),
    };
    ProviderHandle {
        name: adapter.name().to_string(),
        config,
        adapter,
    }
}
