//! Runtime status reporting
//!
//! Assembles a point-in-time view across the fleet, the file coordinator,
//! and the intelligence store, with per-role model recommendations. Written
//! for operators: the report is serialized to JSON and logged at the end of
//! a session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::{AgentRole, TaskKind};
use crate::coordinator::{CoordinationStats, FileCoordinator};
use crate::fleet::{FleetManager, MemoryStatus, ModelType};
use crate::intelligence::{IntelligenceStore, IntelligenceSummary};
use crate::selector::{ModelSelector, Priority};

#[derive(Debug, Clone, Serialize)]
pub struct ModelReportEntry {
    pub key: String,
    pub model_type: ModelType,
    pub estimated_vram_mb: u64,
    pub is_loaded: bool,
    pub is_responsive: bool,
    pub calls: u64,
    pub errors: u64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub memory: MemoryStatus,
    pub coordination: CoordinationStats,
    pub models: Vec<ModelReportEntry>,
    /// Which model each role would get for a balanced generic request.
    pub recommendations: BTreeMap<String, String>,
    pub agents: Vec<IntelligenceSummary>,
}

pub struct StatusReporter {
    fleet: Arc<FleetManager>,
    selector: Arc<ModelSelector>,
    coordinator: Arc<FileCoordinator>,
    store: Arc<IntelligenceStore>,
}

impl StatusReporter {
    pub fn new(
        fleet: Arc<FleetManager>,
        selector: Arc<ModelSelector>,
        coordinator: Arc<FileCoordinator>,
        store: Arc<IntelligenceStore>,
    ) -> Self {
        Self {
            fleet,
            selector,
            coordinator,
            store,
        }
    }

    pub async fn generate(&self, agent_ids: &[String]) -> StatusReport {
        let mut models: Vec<ModelReportEntry> = self
            .fleet
            .snapshot()
            .await
            .into_iter()
            .map(|entry| ModelReportEntry {
                key: entry.key.to_string(),
                model_type: entry.capabilities.model_type,
                estimated_vram_mb: entry.estimated_vram_mb,
                is_loaded: entry.is_loaded,
                is_responsive: entry.is_responsive,
                calls: entry.calls,
                errors: entry.errors,
                avg_response_ms: entry.avg_response_ms,
            })
            .collect();
        models.sort_by(|a, b| a.key.cmp(&b.key));

        let mut recommendations = BTreeMap::new();
        for role in [
            AgentRole::Architect,
            AgentRole::Backend,
            AgentRole::Frontend,
            AgentRole::Qa,
            AgentRole::Orchestrator,
        ] {
            if let Some(key) = self
                .selector
                .select(role, TaskKind::Generic, Priority::Balanced)
                .await
            {
                recommendations.insert(role.to_string(), key.to_string());
            }
        }

        let mut agents = Vec::new();
        for agent_id in agent_ids {
            agents.push(self.store.summary(agent_id).await);
        }

        StatusReport {
            generated_at: Utc::now(),
            memory: self.fleet.memory_status().await,
            coordination: self.coordinator.stats().await,
            models,
            recommendations,
            agents,
        }
    }
}
