//! Cooperative agent loop
//!
//! One runtime per agent: analyze the workspace, pick a task, generate with
//! the best model, apply the result through the file coordinator, learn from
//! the outcome, share state, rest. The loop polls its wall-clock deadline
//! between phases and always saves the profile on the way out; iteration
//! errors are contained and never terminate the runtime.

use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::analysis::{ProjectAnalysis, ProjectAnalyzer};
use crate::agent::work::{Task, WorkSource};
use crate::agent::AgentRole;
use crate::coordinator::FileCoordinator;
use crate::error::{FleetError, FleetResult};
use crate::intelligence::{
    AgentProfile, IntelligenceStore, LearningEvent, TaskRecord, DEFAULT_INSIGHT_AGE,
    DEFAULT_INSIGHT_LIMIT,
};
use crate::provider::GenerationParams;
use crate::router::RequestRouter;
use crate::selector::Priority;

struct TaskOutcome {
    applied: bool,
    model_used: String,
}

pub struct AgentRuntime {
    id: String,
    role: AgentRole,
    workspace_root: PathBuf,
    router: Arc<RequestRouter>,
    coordinator: Arc<FileCoordinator>,
    store: Arc<IntelligenceStore>,
    work: Arc<dyn WorkSource>,
    priority: Priority,
    tasks_attempted: u64,
    tasks_succeeded: u64,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        role: AgentRole,
        workspace_root: impl Into<PathBuf>,
        router: Arc<RequestRouter>,
        coordinator: Arc<FileCoordinator>,
        store: Arc<IntelligenceStore>,
        work: Arc<dyn WorkSource>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            workspace_root: workspace_root.into(),
            router,
            coordinator,
            store,
            work,
            priority: Priority::Balanced,
            tasks_attempted: 0,
            tasks_succeeded: 0,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the cooperative loop until `deadline`. The profile is restored at
    /// entry and saved on exit, whatever happened in between.
    pub async fn run(&mut self, deadline: Instant) -> FleetResult<()> {
        let session_start = Instant::now();
        let mut profile = self.store.restore_profile(&self.id).await;
        info!(
            agent = %self.id,
            role = %self.role,
            level = profile.intelligence_level,
            "agent session started"
        );

        let analyzer = ProjectAnalyzer::new(&self.workspace_root);
        while Instant::now() < deadline {
            if let Err(e) = self.iteration(&mut profile, &analyzer).await {
                warn!(agent = %self.id, error = %e, "iteration failed");
            }

            let rest = profile.rest_duration();
            if Instant::now() + rest >= deadline {
                break;
            }
            debug!(agent = %self.id, rest_s = rest.as_secs(), "resting");
            tokio::time::sleep(rest).await;
        }

        profile.cumulative_runtime_s += session_start.elapsed().as_secs();
        self.store.save_profile(&self.id, profile.clone()).await?;
        info!(
            agent = %self.id,
            level = profile.intelligence_level,
            attempted = self.tasks_attempted,
            succeeded = self.tasks_succeeded,
            "agent session finished"
        );
        Ok(())
    }

    async fn iteration(
        &mut self,
        profile: &mut AgentProfile,
        analyzer: &ProjectAnalyzer,
    ) -> FleetResult<()> {
        let analysis = analyzer.analyze(profile.intelligence_level).await?;
        debug!(agent = %self.id, digest = %analysis.digest(), "analysis complete");

        if let Some(task) = self.decide(profile).await? {
            info!(agent = %self.id, task = %task.title, kind = %task.kind, "task selected");
            let outcome = self.execute(&task, profile, &analysis).await;

            self.tasks_attempted += 1;
            if outcome.applied {
                self.tasks_succeeded += 1;
            }

            let mut metrics = BTreeMap::new();
            metrics.insert(
                "avg_success_rate".to_string(),
                self.tasks_succeeded as f64 / self.tasks_attempted as f64,
            );
            metrics.insert(
                "tasks_per_hour".to_string(),
                self.tasks_attempted as f64 / session_hours_floor(profile),
            );

            let event = LearningEvent {
                success: outcome.applied,
                complexity_factor: task.complexity as f64 / 10.0,
                pattern: outcome
                    .applied
                    .then(|| format!("{} handled by {}", task.kind, outcome.model_used)),
                strategy: outcome
                    .applied
                    .then(|| format!("{} tasks suit {}", task.kind, self.role)),
                metrics,
                task: Some(TaskRecord {
                    title: task.title.clone(),
                    kind: task.kind,
                    success: outcome.applied,
                    timestamp: chrono::Utc::now(),
                }),
                collaboration: None,
                model_preference: (outcome.model_used != "fallback")
                    .then(|| (task.kind, outcome.model_used.clone())),
            };
            *profile = self.store.update_learning(&self.id, event).await?;

            self.store
                .store_experience(
                    &self.id,
                    "task_completion",
                    json!({
                        "task": task.title,
                        "kind": task.kind,
                        "success": outcome.applied,
                        "model": outcome.model_used,
                    }),
                )
                .await?;
        } else {
            debug!(agent = %self.id, "no suitable task this iteration");
        }

        // Share a heartbeat so other agents can see what this one is doing.
        self.store
            .store_experience(
                &self.id,
                "status",
                json!({
                    "role": self.role,
                    "intelligence_level": profile.intelligence_level,
                    "tasks_attempted": self.tasks_attempted,
                }),
            )
            .await?;

        let insights = self
            .store
            .collaborative_insights(&self.id, DEFAULT_INSIGHT_AGE, DEFAULT_INSIGHT_LIMIT)
            .await;
        if !insights.is_empty() {
            debug!(agent = %self.id, count = insights.len(), "collaborative insights read");
        }

        Ok(())
    }

    /// Pick the best open task within this agent's complexity ceiling.
    /// Over-complex tasks are deferred unless the agent is smart enough to
    /// scale them down and try anyway.
    async fn decide(&self, profile: &AgentProfile) -> FleetResult<Option<Task>> {
        let candidates = self.work.next_tasks(self.role, 5).await?;
        let ceiling = profile.max_complexity();

        for mut task in candidates {
            if task.complexity <= ceiling {
                self.work.mark_in_flight(&task.id).await;
                return Ok(Some(task));
            }
            if profile.can_scale_down_tasks() {
                debug!(
                    agent = %self.id,
                    task = %task.title,
                    from = task.complexity,
                    to = ceiling,
                    "scaling down over-complex task"
                );
                task.complexity = ceiling;
                self.work.mark_in_flight(&task.id).await;
                return Ok(Some(task));
            }
            debug!(agent = %self.id, task = %task.title, "deferring over-complex task");
        }
        Ok(None)
    }

    async fn execute(
        &self,
        task: &Task,
        profile: &AgentProfile,
        analysis: &ProjectAnalysis,
    ) -> TaskOutcome {
        let prompt = self.prompt_for(task, profile, analysis);
        let params = GenerationParams {
            temperature: profile.temperature(),
            max_tokens: 512,
        };
        let generation = self
            .router
            .generate(self.role, &prompt, task.kind, self.priority, params)
            .await;

        if !generation.success {
            warn!(agent = %self.id, task = %task.title, "generation fell back, task not applied");
            return TaskOutcome {
                applied: false,
                model_used: generation.model_used,
            };
        }

        let applied = match &task.target_path {
            Some(target) => {
                let destination = self.workspace_root.join(target);
                match self
                    .coordinator
                    .safe_write(
                        &destination,
                        generation.content.as_bytes(),
                        &self.id,
                        task.priority as i32,
                    )
                    .await
                {
                    Ok(version) => {
                        info!(
                            agent = %self.id,
                            path = %destination.display(),
                            version,
                            "artifact written"
                        );
                        true
                    }
                    Err(FleetError::Locked { path, reason }) => {
                        // Abort without partial writes; another agent owns it.
                        warn!(agent = %self.id, path, reason, "target locked, aborting task");
                        false
                    }
                    Err(e) => {
                        warn!(agent = %self.id, error = %e, "artifact write failed");
                        false
                    }
                }
            }
            None => {
                let stored = self
                    .store
                    .add_memory(
                        &self.id,
                        format!("{}: {}", task.title, generation.content),
                        vec![task.kind.to_string()],
                    )
                    .await;
                match stored {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(agent = %self.id, error = %e, "memory write failed");
                        false
                    }
                }
            }
        };

        TaskOutcome {
            applied,
            model_used: generation.model_used,
        }
    }

    fn prompt_for(&self, task: &Task, profile: &AgentProfile, analysis: &ProjectAnalysis) -> String {
        format!(
            "You are the {} agent of a local development fleet (competence {:.1}/10).\n\
             Workspace: {}.\n\n\
             Task ({}, complexity {}/10): {}\n{}\n\n\
             Produce the complete artifact content only, no surrounding commentary.",
            self.role,
            profile.intelligence_level,
            analysis.digest(),
            task.kind,
            task.complexity,
            task.title,
            task.description,
        )
    }
}

/// Session length in hours for throughput metrics, floored so the first
/// iterations do not divide by near-zero.
fn session_hours_floor(profile: &AgentProfile) -> f64 {
    let hours = profile.cumulative_runtime_s as f64 / 3600.0;
    hours.max(0.1)
}
