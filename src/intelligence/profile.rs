//! Agent intelligence profiles
//!
//! A profile is the cross-session state of one agent: a clamped intelligence
//! level with diminishing-returns growth, bounded histories of what worked,
//! and the behavior knobs derived from the level (scan depth, temperature,
//! rest time, complexity ceiling).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::agent::TaskKind;

pub const MIN_INTELLIGENCE: f64 = 1.0;
pub const MAX_INTELLIGENCE: f64 = 10.0;

pub const MAX_PATTERNS: usize = 50;
pub const MAX_STRATEGIES: usize = 30;
pub const MAX_TASK_HISTORY: usize = 100;
pub const MAX_COLLABORATIONS: usize = 20;

/// Diminishing-returns learning rate: fast early, crawling near the cap.
pub fn learning_rate(level: f64) -> f64 {
    (0.1 - 0.008 * level).max(0.01)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub title: String,
    pub kind: TaskKind,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRecord {
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

/// One learning observation fed back after a task attempt.
#[derive(Debug, Clone, Default)]
pub struct LearningEvent {
    pub success: bool,
    /// 0.0..=1.0, usually `task.complexity / 10`.
    pub complexity_factor: f64,
    pub pattern: Option<String>,
    pub strategy: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub task: Option<TaskRecord>,
    pub collaboration: Option<String>,
    /// Remember which model served this task kind well.
    pub model_preference: Option<(TaskKind, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub intelligence_level: f64,
    pub sessions_count: u64,
    pub cumulative_runtime_s: u64,
    #[serde(default)]
    pub learned_patterns: VecDeque<String>,
    #[serde(default)]
    pub successful_strategies: VecDeque<String>,
    #[serde(default)]
    pub task_history: VecDeque<TaskRecord>,
    #[serde(default)]
    pub collaborations: VecDeque<CollaborationRecord>,
    #[serde(default)]
    pub model_preferences: BTreeMap<TaskKind, String>,
    #[serde(default)]
    pub performance_metrics: BTreeMap<String, f64>,
    pub last_update: DateTime<Utc>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            intelligence_level: MIN_INTELLIGENCE,
            sessions_count: 0,
            cumulative_runtime_s: 0,
            learned_patterns: VecDeque::new(),
            successful_strategies: VecDeque::new(),
            task_history: VecDeque::new(),
            collaborations: VecDeque::new(),
            model_preferences: BTreeMap::new(),
            performance_metrics: BTreeMap::new(),
            last_update: Utc::now(),
        }
    }
}

impl AgentProfile {
    /// Fold one learning event into the profile. Growth only happens on
    /// success and is clamped to the intelligence cap.
    pub fn apply(&mut self, event: &LearningEvent) {
        if event.success {
            let gain = 0.05 * event.complexity_factor * learning_rate(self.intelligence_level);
            self.intelligence_level = (self.intelligence_level + gain).min(MAX_INTELLIGENCE);
        }

        if let Some(pattern) = &event.pattern {
            push_unique(&mut self.learned_patterns, pattern.clone(), MAX_PATTERNS);
        }
        if let Some(strategy) = &event.strategy {
            push_unique(
                &mut self.successful_strategies,
                strategy.clone(),
                MAX_STRATEGIES,
            );
        }
        for (key, value) in &event.metrics {
            self.performance_metrics.insert(key.clone(), *value);
        }
        if let Some(task) = &event.task {
            push_ring(&mut self.task_history, task.clone(), MAX_TASK_HISTORY);
        }
        if let Some(note) = &event.collaboration {
            push_ring(
                &mut self.collaborations,
                CollaborationRecord {
                    note: note.clone(),
                    timestamp: Utc::now(),
                },
                MAX_COLLABORATIONS,
            );
        }
        if let Some((kind, model)) = &event.model_preference {
            if event.success {
                self.model_preferences.insert(*kind, model.clone());
            }
        }
        self.last_update = Utc::now();
    }

    /// Smarter agents rest less between iterations.
    pub fn rest_duration(&self) -> Duration {
        let secs = (30.0 - 2.0 * self.intelligence_level).max(10.0);
        Duration::from_secs_f64(secs)
    }

    /// Generation temperature falls as intelligence rises.
    pub fn temperature(&self) -> f32 {
        let t = 0.7 * (MAX_INTELLIGENCE - self.intelligence_level) / MAX_INTELLIGENCE;
        (t as f32).max(0.1)
    }

    /// File-scan budget for project analysis.
    pub fn scan_capacity(&self) -> usize {
        ((10.0 + 5.0 * self.intelligence_level) as usize).clamp(10, 100)
    }

    /// Highest task complexity this agent should attempt as-is.
    pub fn max_complexity(&self) -> u8 {
        let raw = (3.0 + (self.intelligence_level - 1.0) * 0.78) as u8;
        raw.clamp(3, 10)
    }

    /// Whether the agent may scale an over-complex task down and attempt it.
    pub fn can_scale_down_tasks(&self) -> bool {
        self.intelligence_level >= 6.0
    }
}

fn push_unique(buffer: &mut VecDeque<String>, value: String, cap: usize) {
    if buffer.contains(&value) {
        return;
    }
    push_ring(buffer, value, cap);
}

fn push_ring<T>(buffer: &mut VecDeque<T>, value: T, cap: usize) {
    buffer.push_back(value);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}
