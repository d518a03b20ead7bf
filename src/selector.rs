//! Intelligent model selector
//!
//! Maps an (agent role, task kind, priority) request to the best currently
//! serviceable model. Scoring is pure; the only side effect is asking the
//! fleet manager to load a candidate when nothing is already serviceable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::{AgentRole, TaskKind};
use crate::config::{split_model_ref, FleetConfig, ProviderKind};
use crate::fleet::{FleetManager, ModelEntry, ModelKey, ModelType};

/// What the caller wants optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Speed,
    Quality,
    Balanced,
}

#[derive(Debug, Clone, Default)]
struct ResolvedAssignment {
    primary: Vec<ModelKey>,
    fallback: Vec<ModelKey>,
}

pub struct ModelSelector {
    fleet: Arc<FleetManager>,
    assignments: BTreeMap<AgentRole, ResolvedAssignment>,
}

impl ModelSelector {
    pub fn new(fleet: Arc<FleetManager>, config: &FleetConfig) -> Self {
        let mut assignments = BTreeMap::new();
        for (role, assignment) in &config.agent_assignments {
            let resolve = |entries: &[String]| -> Vec<ModelKey> {
                entries
                    .iter()
                    .filter_map(|entry| match split_model_ref(entry) {
                        (Some(provider), model) => Some(ModelKey::new(provider, model)),
                        // Unqualified ids match on any provider; keep the id
                        // with an empty provider and compare by model_id only.
                        (None, model) => Some(ModelKey::new("", model)),
                    })
                    .collect()
            };
            assignments.insert(
                *role,
                ResolvedAssignment {
                    primary: resolve(&assignment.primary),
                    fallback: resolve(&assignment.fallback),
                },
            );
        }
        Self { fleet, assignments }
    }

    /// Pick the best serviceable model, loading one if the fleet has nothing
    /// loaded and responsive that fits. `None` means the router must fall back.
    pub async fn select(
        &self,
        role: AgentRole,
        task: TaskKind,
        priority: Priority,
    ) -> Option<ModelKey> {
        let snapshot = self.fleet.snapshot().await;

        let mut serviceable: Vec<&ModelEntry> = snapshot
            .iter()
            .filter(|m| m.is_loaded && m.is_responsive)
            .collect();
        if !serviceable.is_empty() {
            self.rank(&mut serviceable, role, task, priority);
            let best = serviceable[0].key.clone();
            debug!(%role, %task, model = %best, "selected loaded model");
            self.fleet.mark_used(&best).await;
            return Some(best);
        }

        // Nothing serviceable: try to bring up the best candidate that fits.
        let budget = self.fleet.max_vram_mb();
        let mut candidates: Vec<&ModelEntry> = snapshot
            .iter()
            .filter(|m| !m.is_loaded && m.estimated_vram_mb <= budget)
            .collect();
        if candidates.is_empty() {
            warn!(%role, %task, "no serviceable models and no loadable candidates");
            return None;
        }
        self.rank(&mut candidates, role, task, priority);

        for candidate in candidates {
            match self.fleet.ensure_loaded(&candidate.key).await {
                Ok(()) => {
                    info!(%role, %task, model = %candidate.key, "loaded model for selection");
                    return Some(candidate.key.clone());
                }
                Err(e) => {
                    debug!(model = %candidate.key, error = %e, "candidate not loadable");
                }
            }
        }
        None
    }

    fn rank(&self, entries: &mut [&ModelEntry], role: AgentRole, task: TaskKind, priority: Priority) {
        entries.sort_by(|a, b| {
            let sa = self.score(a, role, task, priority);
            let sb = self.score(b, role, task, priority);
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.last_used.cmp(&a.last_used))
                .then_with(|| a.key.cmp(&b.key))
        });
    }

    /// Score one model for one request. Pure.
    pub fn score(
        &self,
        entry: &ModelEntry,
        role: AgentRole,
        task: TaskKind,
        priority: Priority,
    ) -> f64 {
        let caps = &entry.capabilities;

        let mut score = if caps.suitable_for.contains(&task) {
            5.0
        } else if caps.model_type == ModelType::General {
            2.0
        } else {
            0.0
        };

        if role.preferred_model_types().contains(&caps.model_type) {
            score += 3.0;
        }

        score += match priority {
            Priority::Speed => 0.8 * caps.speed_score as f64,
            Priority::Quality => 0.8 * caps.quality_score as f64,
            Priority::Balanced => 0.4 * (caps.speed_score + caps.quality_score) as f64,
        };

        if self.fleet.provider_kind(&entry.key.provider) == Some(ProviderKind::OpenaiChat) {
            score += 0.5;
        }

        if let Some(assignment) = self.assignments.get(&role) {
            if assignment.primary.iter().any(|k| matches_assignment(k, &entry.key)) {
                score += 1.0;
            } else if assignment.fallback.iter().any(|k| matches_assignment(k, &entry.key)) {
                score += 0.5;
            }
        }

        if entry.calls > 0 {
            score *= entry.success_ratio();
        }
        score
    }
}

fn matches_assignment(assigned: &ModelKey, candidate: &ModelKey) -> bool {
    if assigned.provider.is_empty() {
        assigned.model_id == candidate.model_id
    } else {
        assigned == candidate
    }
}
