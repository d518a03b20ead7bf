//! Persistent intelligence store
//!
//! Cross-session persistence for agent profiles, a shared experience log,
//! and a keyword-queryable memory store. Everything is JSON on disk under
//! `data/memory/`, and every write goes through the file coordinator so
//! concurrent agents cannot corrupt the documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::FileCoordinator;
use crate::error::{FleetError, FleetResult};
use crate::intelligence::profile::{AgentProfile, LearningEvent};

/// Store writes outrank routine agent file traffic.
const PERSIST_PRIORITY: i32 = 3;
const STORE_AGENT_ID: &str = "intelligence-store";

const PROFILES_FILE: &str = "agent_intelligence.json";
const EXPERIENCES_FILE: &str = "agent_experiences.json";
const MEMORIES_FILE: &str = "memories.json";

pub const DEFAULT_INSIGHT_AGE: Duration = Duration::from_secs(3600);
pub const DEFAULT_INSIGHT_LIMIT: usize = 10;

/// A shared, agent-tagged record of something that happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub agent_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Another agent's recent experience, surfaced to a requester.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub source_agent: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub age_minutes: f64,
}

/// An entry in the shared keyword memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntelligenceSummary {
    pub agent_id: String,
    pub intelligence_level: f64,
    pub sessions_count: u64,
    pub patterns_learned: usize,
    pub strategies_mastered: usize,
    pub tasks_completed: usize,
    pub collaborations: usize,
    pub performance_score: f64,
}

pub struct IntelligenceStore {
    memory_dir: PathBuf,
    coordinator: Arc<FileCoordinator>,
    profiles: RwLock<BTreeMap<String, AgentProfile>>,
    experiences: RwLock<Vec<Experience>>,
    memories: RwLock<BTreeMap<String, MemoryRecord>>,
}

impl IntelligenceStore {
    /// Open (or initialize) the store under `<workspace>/data/memory`.
    pub async fn open(
        workspace_root: impl AsRef<Path>,
        coordinator: Arc<FileCoordinator>,
    ) -> FleetResult<Self> {
        let memory_dir = workspace_root.as_ref().join("data").join("memory");
        tokio::fs::create_dir_all(&memory_dir).await.map_err(|e| {
            FleetError::Fatal(format!(
                "cannot create memory dir {}: {e}",
                memory_dir.display()
            ))
        })?;

        let store = Self {
            memory_dir,
            coordinator,
            profiles: RwLock::new(BTreeMap::new()),
            experiences: RwLock::new(Vec::new()),
            memories: RwLock::new(BTreeMap::new()),
        };
        store.load().await;
        Ok(store)
    }

    async fn load(&self) {
        if let Some(profiles) = self.read_document(PROFILES_FILE).await {
            let mut cache = self.profiles.write().await;
            *cache = profiles;
            info!(agents = cache.len(), "restored intelligence profiles");
        }
        if let Some(experiences) = self.read_document(EXPERIENCES_FILE).await {
            let mut cache = self.experiences.write().await;
            *cache = experiences;
            debug!(count = cache.len(), "restored shared experiences");
        }
        if let Some(memories) = self.read_document(MEMORIES_FILE).await {
            let mut cache = self.memories.write().await;
            *cache = memories;
            debug!(count = cache.len(), "restored shared memories");
        }
    }

    async fn read_document<T: serde::de::DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.memory_dir.join(file);
        let bytes = self.coordinator.safe_read(&path, STORE_AGENT_ID).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(file, error = %e, "memory document unreadable, starting fresh");
                None
            }
        }
    }

    async fn persist<T: Serialize>(&self, file: &str, value: &T) -> FleetResult<()> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| FleetError::Fatal(format!("cannot encode {file}: {e}")))?;
        self.coordinator
            .safe_write(
                self.memory_dir.join(file),
                &body,
                STORE_AGENT_ID,
                PERSIST_PRIORITY,
            )
            .await?;
        Ok(())
    }

    /// Restore an agent's profile, creating a fresh one on first contact.
    /// Each restore counts as a new session.
    pub async fn restore_profile(&self, agent_id: &str) -> AgentProfile {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.entry(agent_id.to_string()).or_insert_with(|| {
            info!(agent = agent_id, "creating fresh intelligence profile");
            AgentProfile::default()
        });
        profile.sessions_count += 1;
        info!(
            agent = agent_id,
            level = profile.intelligence_level,
            session = profile.sessions_count,
            "restored intelligence profile"
        );
        profile.clone()
    }

    pub async fn save_profile(&self, agent_id: &str, profile: AgentProfile) -> FleetResult<()> {
        let snapshot = {
            let mut profiles = self.profiles.write().await;
            profiles.insert(agent_id.to_string(), profile);
            profiles.clone()
        };
        self.persist(PROFILES_FILE, &snapshot).await
    }

    /// Fold a learning event into the agent's profile and persist. Returns
    /// the updated profile so the caller can stay in sync.
    pub async fn update_learning(
        &self,
        agent_id: &str,
        event: LearningEvent,
    ) -> FleetResult<AgentProfile> {
        let (updated, snapshot) = {
            let mut profiles = self.profiles.write().await;
            let profile = profiles.entry(agent_id.to_string()).or_default();
            profile.apply(&event);
            (profile.clone(), profiles.clone())
        };
        debug!(
            agent = agent_id,
            level = updated.intelligence_level,
            "learning recorded"
        );
        self.persist(PROFILES_FILE, &snapshot).await?;
        Ok(updated)
    }

    pub async fn summary(&self, agent_id: &str) -> IntelligenceSummary {
        let profiles = self.profiles.read().await;
        match profiles.get(agent_id) {
            Some(profile) => IntelligenceSummary {
                agent_id: agent_id.to_string(),
                intelligence_level: profile.intelligence_level,
                sessions_count: profile.sessions_count,
                patterns_learned: profile.learned_patterns.len(),
                strategies_mastered: profile.successful_strategies.len(),
                tasks_completed: profile.task_history.len(),
                collaborations: profile.collaborations.len(),
                performance_score: profile
                    .performance_metrics
                    .get("avg_success_rate")
                    .copied()
                    .unwrap_or(0.0),
            },
            None => IntelligenceSummary {
                agent_id: agent_id.to_string(),
                intelligence_level: 1.0,
                sessions_count: 0,
                patterns_learned: 0,
                strategies_mastered: 0,
                tasks_completed: 0,
                collaborations: 0,
                performance_score: 0.0,
            },
        }
    }

    /// Append a shared experience record and persist the log.
    pub async fn store_experience(
        &self,
        agent_id: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> FleetResult<()> {
        let snapshot = {
            let mut experiences = self.experiences.write().await;
            experiences.push(Experience {
                id: Uuid::new_v4().to_string(),
                agent_id: agent_id.to_string(),
                kind: kind.to_string(),
                payload,
                timestamp: Utc::now(),
            });
            experiences.clone()
        };
        self.persist(EXPERIENCES_FILE, &snapshot).await
    }

    /// Recent experiences from *other* agents, newest first.
    pub async fn collaborative_insights(
        &self,
        requester: &str,
        max_age: Duration,
        limit: usize,
    ) -> Vec<Insight> {
        let now = Utc::now();
        let experiences = self.experiences.read().await;
        let mut insights: Vec<Insight> = experiences
            .iter()
            .filter(|e| e.agent_id != requester)
            .filter_map(|e| {
                let age = (now - e.timestamp).to_std().ok()?;
                (age < max_age).then(|| Insight {
                    source_agent: e.agent_id.clone(),
                    kind: e.kind.clone(),
                    payload: e.payload.clone(),
                    age_minutes: age.as_secs_f64() / 60.0,
                })
            })
            .collect();
        insights.sort_by(|a, b| {
            a.age_minutes
                .partial_cmp(&b.age_minutes)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        insights.truncate(limit);
        debug!(requester, count = insights.len(), "collaborative insights");
        insights
    }

    /// Add a record to the shared keyword memory. Returns the memory id.
    pub async fn add_memory(
        &self,
        agent_id: &str,
        content: impl Into<String>,
        tags: Vec<String>,
    ) -> FleetResult<String> {
        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            content: content.into(),
            tags,
            timestamp: Utc::now(),
        };
        let id = record.id.clone();
        let snapshot = {
            let mut memories = self.memories.write().await;
            memories.insert(id.clone(), record);
            memories.clone()
        };
        self.persist(MEMORIES_FILE, &snapshot).await?;
        Ok(id)
    }

    pub async fn get_memory(&self, memory_id: &str) -> Option<MemoryRecord> {
        self.memories.read().await.get(memory_id).cloned()
    }

    /// Keyword search over content and tags; simple term-count scoring with
    /// newest-first tie-break.
    pub async fn query_memory(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let memories = self.memories.read().await;
        let mut scored: Vec<(usize, &MemoryRecord)> = memories
            .values()
            .filter_map(|record| {
                let haystack = format!(
                    "{} {}",
                    record.content.to_lowercase(),
                    record.tags.join(" ").to_lowercase()
                );
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then_some((score, record))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.timestamp.cmp(&a.1.timestamp)));
        scored.into_iter().take(limit).map(|(_, r)| r.clone()).collect()
    }
}
