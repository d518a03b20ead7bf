//! Work source - read-only provider of tasks
//!
//! The queue itself is an external collaborator; the runtime only pulls
//! tasks and marks them in-flight for the duration of its own session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agent::AgentRole;
use crate::error::FleetResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreateComponent,
    OptimizeCode,
    EnhanceFunctionality,
    CreateConfig,
    Generic,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::CreateComponent => write!(f, "create_component"),
            TaskKind::OptimizeCode => write!(f, "optimize_code"),
            TaskKind::EnhanceFunctionality => write!(f, "enhance_functionality"),
            TaskKind::CreateConfig => write!(f, "create_config"),
            TaskKind::Generic => write!(f, "generic"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub title: String,
    pub description: String,
    /// Higher runs first.
    pub priority: u8,
    /// 1..=10; gates which agents may attempt the task.
    pub complexity: u8,
    /// Workspace-relative artifact target, when the task produces a file.
    pub target_path: Option<PathBuf>,
}

impl Task {
    pub fn new(kind: TaskKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            description: description.into(),
            priority: 5,
            complexity: 5,
            target_path: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target_path = Some(target.into());
        self
    }
}

/// Read-only task feed. Implementations must never be mutated by the core
/// beyond the session-local in-flight mark.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Up to `limit` tasks suitable for `role`, best first.
    async fn next_tasks(&self, role: AgentRole, limit: usize) -> FleetResult<Vec<Task>>;

    /// Mark a task as claimed for this session. Default: no-op.
    async fn mark_in_flight(&self, _task_id: &str) {}
}

/// In-process work source seeded with a fixed backlog.
pub struct InMemoryWorkSource {
    tasks: RwLock<Vec<Task>>,
    in_flight: RwLock<HashSet<String>>,
}

impl InMemoryWorkSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
            in_flight: RwLock::new(HashSet::new()),
        }
    }

    /// The stock improvement backlog used when no external feed is wired up.
    pub fn default_backlog() -> Self {
        Self::new(vec![
            Task::new(
                TaskKind::CreateComponent,
                "Intelligent system monitoring",
                "Implement a monitoring module with health checks and alerting hooks.",
            )
            .with_priority(8)
            .with_complexity(8)
            .with_target("components/monitoring.md"),
            Task::new(
                TaskKind::OptimizeCode,
                "Automatic performance optimization",
                "Propose a self-tuning pass over the hottest code paths.",
            )
            .with_priority(7)
            .with_complexity(9),
            Task::new(
                TaskKind::EnhanceFunctionality,
                "Intelligent deployment pipeline",
                "Describe a deployment flow with automatic rollback and health checks.",
            )
            .with_priority(8)
            .with_complexity(7)
            .with_target("components/deployment.md"),
            Task::new(
                TaskKind::CreateConfig,
                "Advanced security baseline",
                "Produce a hardening configuration covering authentication and audit logging.",
            )
            .with_priority(9)
            .with_complexity(6)
            .with_target("config/security_baseline.yaml"),
            Task::new(
                TaskKind::Generic,
                "Project status notes",
                "Summarize the current state of the workspace for the next session.",
            )
            .with_priority(4)
            .with_complexity(3),
        ])
    }
}

#[async_trait]
impl WorkSource for InMemoryWorkSource {
    async fn next_tasks(&self, _role: AgentRole, limit: usize) -> FleetResult<Vec<Task>> {
        let in_flight = self.in_flight.read().await;
        let tasks = self.tasks.read().await;
        let mut open: Vec<Task> = tasks
            .iter()
            .filter(|t| !in_flight.contains(&t.id))
            .cloned()
            .collect();
        // Stable ordering: priority first, then title for determinism.
        open.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.title.cmp(&b.title)));
        open.truncate(limit);
        Ok(open)
    }

    async fn mark_in_flight(&self, task_id: &str) {
        self.in_flight.write().await.insert(task_id.to_string());
    }
}
