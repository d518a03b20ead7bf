//! Model fleet manager
//!
//! Authoritative view of which models exist across providers, which are
//! loaded, and what they cost in VRAM. The budget is enforced here and only
//! here: every mutation happens under the fleet's internal mutex, and
//! discovery cycles are serialized by their own gate.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{FleetConfig, ProviderConfig, ProviderKind};
use crate::error::{FleetError, FleetResult};
use crate::fleet::model::{ModelEntry, ModelKey};
use crate::fleet::vram;
use crate::provider::{adapter_for, DiscoveredModel, ProbeOutcome, ProviderAdapter};

const LIST_DEADLINE: Duration = Duration::from_secs(5);
const PROBE_DEADLINE: Duration = Duration::from_secs(5);
const LOAD_DEADLINE: Duration = Duration::from_secs(120);
const UNLOAD_DEADLINE: Duration = Duration::from_secs(15);
const STALE_WINDOW: Duration = Duration::from_secs(300);

/// An enabled provider together with its wire adapter.
pub struct ProviderHandle {
    pub name: String,
    pub config: ProviderConfig,
    pub adapter: Arc<dyn ProviderAdapter>,
}

#[derive(Default)]
struct FleetState {
    models: HashMap<ModelKey, ModelEntry>,
    current_vram_mb: u64,
    provider_online: BTreeMap<String, bool>,
}

/// Point-in-time VRAM and host memory report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStatus {
    pub max_vram_mb: u64,
    pub current_vram_mb: u64,
    pub available_vram_mb: u64,
    pub loaded_models: usize,
    pub available_models: usize,
    pub host_ram_used_mb: u64,
    pub host_ram_total_mb: u64,
}

pub struct FleetManager {
    providers: BTreeMap<String, ProviderHandle>,
    max_vram_mb: u64,
    stale_window: Duration,
    probe_deadline: Duration,
    list_deadline: Duration,
    state: Mutex<FleetState>,
    // Serializes discovery cycles; held separately from `state` so selection
    // and routing keep working while a cycle's probes are in flight.
    discovery_gate: Mutex<()>,
    // Serializes loads so two concurrent loads cannot both pass the budget
    // check. Never held together with code that waits on `state`.
    load_gate: Mutex<()>,
}

enum ProviderObservation {
    Online {
        listed: Vec<DiscoveredModel>,
        probes: Vec<FleetResult<ProbeOutcome>>,
    },
    Offline,
}

impl FleetManager {
    pub fn from_config(config: &FleetConfig) -> FleetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(150))
            .build()
            .map_err(|e| FleetError::Fatal(format!("cannot build http client: {e}")))?;

        let providers = config
            .enabled_providers()
            .map(|(name, pc)| ProviderHandle {
                name: name.clone(),
                config: pc.clone(),
                adapter: adapter_for(name, pc, client.clone()),
            })
            .collect::<Vec<_>>();

        if providers.is_empty() {
            return Err(FleetError::Fatal("no enabled providers".to_string()));
        }
        Ok(Self::with_providers(providers, config.max_vram_mb))
    }

    /// Construct from pre-built provider handles; tests inject mock adapters
    /// through this path.
    pub fn with_providers(providers: Vec<ProviderHandle>, max_vram_mb: u64) -> Self {
        let providers = providers
            .into_iter()
            .map(|h| (h.name.clone(), h))
            .collect::<BTreeMap<_, _>>();
        Self {
            providers,
            max_vram_mb,
            stale_window: STALE_WINDOW,
            probe_deadline: PROBE_DEADLINE,
            list_deadline: LIST_DEADLINE,
            state: Mutex::new(FleetState::default()),
            discovery_gate: Mutex::new(()),
            load_gate: Mutex::new(()),
        }
    }

    pub fn with_stale_window(mut self, window: Duration) -> Self {
        self.stale_window = window;
        self
    }

    pub fn max_vram_mb(&self) -> u64 {
        self.max_vram_mb
    }

    pub fn provider_config(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name).map(|h| &h.config)
    }

    pub fn provider_kind(&self, name: &str) -> Option<ProviderKind> {
        self.providers.get(name).map(|h| h.config.kind)
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).map(|h| h.adapter.clone())
    }

    pub fn provider_handles(&self) -> impl Iterator<Item = &ProviderHandle> {
        self.providers.values()
    }

    /// One full discovery cycle: list every enabled provider, probe every
    /// listed model, reconcile fleet state, and evict stale entries.
    pub async fn discover(&self) -> FleetResult<()> {
        let _gate = self.discovery_gate.lock().await;
        let mut observations = Vec::new();

        for (name, handle) in &self.providers {
            match handle.adapter.list_models(self.list_deadline).await {
                Ok(listed) => {
                    let probes = futures::future::join_all(listed.iter().map(|model| {
                        let adapter = handle.adapter.clone();
                        let id = model.id.clone();
                        let deadline = self.probe_deadline;
                        async move { adapter.probe(&id, deadline).await }
                    }))
                    .await;
                    debug!(provider = %name, models = listed.len(), "provider listing complete");
                    observations.push((name.clone(), ProviderObservation::Online { listed, probes }));
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider offline");
                    observations.push((name.clone(), ProviderObservation::Offline));
                }
            }
        }

        let now = Utc::now();
        let mut state = self.state.lock().await;

        for (name, observation) in observations {
            match observation {
                ProviderObservation::Online { listed, probes } => {
                    state.provider_online.insert(name.clone(), true);
                    for (model, probe) in listed.into_iter().zip(probes) {
                        let key = ModelKey::new(&name, &model.id);
                        let estimate = vram::estimate_vram_mb(&model.id, model.size_bytes);
                        let entry = state.models.entry(key.clone()).or_insert_with(|| {
                            info!(model = %key, vram_mb = estimate, "discovered model");
                            ModelEntry::new(key.clone(), estimate)
                        });
                        entry.estimated_vram_mb = estimate;
                        entry.last_seen = now;
                        match probe {
                            Ok(outcome) => {
                                entry.record_probe(outcome.elapsed_ms, true);
                                entry.is_loaded = true;
                                entry.is_responsive = true;
                            }
                            Err(_) => {
                                entry.record_probe(0, false);
                                entry.is_loaded = false;
                                entry.is_responsive = false;
                            }
                        }
                    }
                }
                ProviderObservation::Offline => {
                    state.provider_online.insert(name.clone(), false);
                    // Keep the entries listed; the stale window removes them
                    // if the provider never comes back.
                    for entry in state
                        .models
                        .values_mut()
                        .filter(|m| m.key.provider == name)
                    {
                        entry.is_loaded = false;
                        entry.is_responsive = false;
                    }
                }
            }
        }

        let cutoff = now
            - chrono::Duration::from_std(self.stale_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        state.models.retain(|key, entry| {
            let keep = entry.last_seen >= cutoff;
            if !keep {
                info!(model = %key, "removing stale model entry");
            }
            keep
        });

        Self::recompute_vram(&mut state, self.max_vram_mb);
        Ok(())
    }

    /// Make sure `key` is loaded, evicting least-recently-used models first
    /// when the budget would otherwise be exceeded. Idempotent when loaded.
    ///
    /// Loads are serialized by their own gate and the wire calls run without
    /// the state lock, so selection, routing, and discovery stay responsive
    /// while a slow load is in flight. The commit re-reads state afterwards.
    pub async fn ensure_loaded(&self, key: &ModelKey) -> FleetResult<()> {
        let handle = self
            .providers
            .get(&key.provider)
            .ok_or_else(|| FleetError::unavailable(&key.provider, "unknown provider"))?;

        let _gate = self.load_gate.lock().await;

        // Validate against current state, holding the lock only briefly.
        let needed = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.models.get_mut(key) else {
                return Err(FleetError::unavailable(
                    &key.provider,
                    format!("model '{}' not discovered", key.model_id),
                ));
            };
            if entry.is_loaded {
                entry.last_used = Some(Utc::now());
                return Ok(());
            }
            entry.estimated_vram_mb
        };

        if needed > self.max_vram_mb {
            return Err(FleetError::OverBudget {
                model: key.to_string(),
                needed_mb: needed,
                budget_mb: self.max_vram_mb,
            });
        }

        if !handle.config.can_load {
            info!(
                provider = %key.provider,
                model = %key.model_id,
                "operator action required: load this model manually on the provider"
            );
            return Err(FleetError::ManualLoadRequired {
                provider: key.provider.clone(),
                model: key.model_id.clone(),
            });
        }

        let current = self.current_vram_mb().await;
        if current + needed > self.max_vram_mb {
            let freed = self.free_vram(current + needed - self.max_vram_mb).await;
            let current = self.current_vram_mb().await;
            if current + needed > self.max_vram_mb {
                warn!(model = %key, freed_mb = freed, "could not free enough VRAM");
                return Err(FleetError::OverBudget {
                    model: key.to_string(),
                    needed_mb: needed,
                    budget_mb: self.max_vram_mb,
                });
            }
        }

        // Wire load plus confirmation probe: loaded means probed. No lock held.
        handle.adapter.load(&key.model_id, LOAD_DEADLINE).await?;
        let probe = handle.adapter.probe(&key.model_id, self.probe_deadline).await;

        // Commit against whatever the state looks like now.
        let mut state = self.state.lock().await;
        match probe {
            Ok(outcome) => {
                if let Some(entry) = state.models.get_mut(key) {
                    entry.record_probe(outcome.elapsed_ms, true);
                    entry.is_loaded = true;
                    entry.is_responsive = true;
                    entry.last_used = Some(Utc::now());
                }
                Self::recompute_vram(&mut state, self.max_vram_mb);
                info!(model = %key, vram_mb = needed, total_mb = state.current_vram_mb, "loaded model");
                Ok(())
            }
            Err(e) => {
                if let Some(entry) = state.models.get_mut(key) {
                    entry.record_probe(0, false);
                }
                warn!(model = %key, error = %e, "model did not answer after load");
                Err(FleetError::unavailable(
                    &key.provider,
                    format!("'{}' did not become responsive after load", key.model_id),
                ))
            }
        }
    }

    /// Unload least-recently-used models until at least `need_mb` is freed or
    /// no candidates remain. Returns the amount actually freed. Candidates are
    /// gathered under the lock, wire unloads run without it, and the
    /// bookkeeping commits afterwards.
    pub async fn free_vram(&self, need_mb: u64) -> u64 {
        info!(need_mb, "freeing VRAM");
        let candidates: Vec<(ModelKey, u64)> = {
            let state = self.state.lock().await;
            let mut loaded: Vec<_> = state
                .models
                .values()
                .filter(|m| m.is_loaded)
                .map(|m| (m.key.clone(), m.last_used, m.estimated_vram_mb))
                .collect();
            loaded.sort_by_key(|(_, last_used, _)| *last_used);
            loaded
                .into_iter()
                .map(|(key, _, estimate)| (key, estimate))
                .collect()
        };

        let mut freed = 0u64;
        let mut unloaded = Vec::new();
        for (key, estimate) in candidates {
            if freed >= need_mb {
                break;
            }
            let Some(handle) = self.providers.get(&key.provider) else {
                continue;
            };
            if !handle.config.can_unload {
                warn!(model = %key, "provider cannot unload models, skipping");
                continue;
            }
            if let Err(e) = handle.adapter.unload(&key.model_id, UNLOAD_DEADLINE).await {
                // Accounting stays optimistic; the next probe cycle reconciles.
                warn!(model = %key, error = %e, "wire unload unavailable, operator hint logged");
            }
            freed += estimate;
            info!(model = %key, vram_mb = estimate, "unloaded model");
            unloaded.push(key);
        }

        if !unloaded.is_empty() {
            let mut state = self.state.lock().await;
            for key in &unloaded {
                if let Some(entry) = state.models.get_mut(key) {
                    entry.is_loaded = false;
                    entry.is_responsive = false;
                }
            }
            Self::recompute_vram(&mut state, self.max_vram_mb);
        }
        freed
    }

    /// Re-derive the VRAM total from the loaded flags; the accounting always
    /// matches the flags, whatever interleaving got us here.
    fn recompute_vram(state: &mut FleetState, max_vram_mb: u64) {
        state.current_vram_mb = state
            .models
            .values()
            .filter(|m| m.is_loaded)
            .map(|m| m.estimated_vram_mb)
            .sum();
        if state.current_vram_mb > max_vram_mb {
            warn!(
                current_mb = state.current_vram_mb,
                budget_mb = max_vram_mb,
                "loaded models exceed the VRAM budget; waiting for eviction"
            );
        }
    }

    /// Periodic re-discovery; spawn this on its own task.
    pub async fn monitor_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            if let Err(e) = self.discover().await {
                warn!(error = %e, "discovery cycle failed");
            }
        }
    }

    /// Fold one routed generation into the model's stats.
    pub async fn record_generation(&self, key: &ModelKey, elapsed_ms: u64, success: bool) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.models.get_mut(key) {
            entry.record_call(elapsed_ms, success);
        }
    }

    pub async fn mark_used(&self, key: &ModelKey) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.models.get_mut(key) {
            entry.last_used = Some(Utc::now());
        }
    }

    /// Cloned view of every tracked model, for the selector.
    pub async fn snapshot(&self) -> Vec<ModelEntry> {
        let state = self.state.lock().await;
        state.models.values().cloned().collect()
    }

    pub async fn entry(&self, key: &ModelKey) -> Option<ModelEntry> {
        let state = self.state.lock().await;
        state.models.get(key).cloned()
    }

    pub async fn current_vram_mb(&self) -> u64 {
        self.state.lock().await.current_vram_mb
    }

    pub async fn provider_online(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state.provider_online.get(name).copied().unwrap_or(false)
    }

    pub async fn memory_status(&self) -> MemoryStatus {
        let (current, loaded, available) = {
            let state = self.state.lock().await;
            (
                state.current_vram_mb,
                state.models.values().filter(|m| m.is_loaded).count(),
                state.models.len(),
            )
        };

        let mut sys = System::new();
        sys.refresh_memory();

        MemoryStatus {
            max_vram_mb: self.max_vram_mb,
            current_vram_mb: current,
            available_vram_mb: self.max_vram_mb.saturating_sub(current),
            loaded_models: loaded,
            available_models: available,
            host_ram_used_mb: sys.used_memory() / 1024 / 1024,
            host_ram_total_mb: sys.total_memory() / 1024 / 1024,
        }
    }
}
