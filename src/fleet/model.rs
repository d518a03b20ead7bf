//! Model records and capability inference
//!
//! Capabilities are inferred from the model id string alone; the heuristics
//! are deliberately coarse and only have to rank models against each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::agent::TaskKind;

/// Identity of a model on a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub provider: String,
    pub model_id: String,
}

impl ModelKey {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
        }
    }

    /// Parse a `provider/model` reference. The model id may itself contain
    /// slashes, so only the first segment is the provider.
    pub fn parse(reference: &str) -> Option<Self> {
        let (provider, model_id) = reference.split_once('/')?;
        if provider.is_empty() || model_id.is_empty() {
            return None;
        }
        Some(Self::new(provider, model_id))
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Coding,
    Conversational,
    Analytical,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub model_type: ModelType,
    pub size: SizeClass,
    pub speed_score: u8,
    pub quality_score: u8,
    pub suitable_for: HashSet<TaskKind>,
}

impl ModelCapabilities {
    /// Infer capabilities from the model id string.
    pub fn infer(model_id: &str) -> Self {
        let lower = model_id.to_lowercase();

        let model_type = if ["code", "llama", "starcoder", "wizardcoder"]
            .iter()
            .any(|w| lower.contains(w))
        {
            ModelType::Coding
        } else if ["instruct", "chat", "assistant"].iter().any(|w| lower.contains(w)) {
            ModelType::Conversational
        } else if ["math", "reasoning"].iter().any(|w| lower.contains(w)) {
            ModelType::Analytical
        } else {
            ModelType::General
        };

        // Large sizes checked first: "13b" also contains the "3b" substring.
        let size = if ["13b", "20b", "22b", "24b", "70b", "72b"]
            .iter()
            .any(|w| lower.contains(w))
        {
            SizeClass::Large
        } else if ["1.5b", "1b", "2b", "3b"].iter().any(|w| lower.contains(w)) {
            SizeClass::Small
        } else {
            SizeClass::Medium
        };

        let (speed_score, quality_score) = match size {
            SizeClass::Small => (5, 2),
            SizeClass::Medium => (3, 3),
            SizeClass::Large => (1, 5),
        };

        let mut suitable_for: HashSet<TaskKind> = match model_type {
            ModelType::Coding => [
                TaskKind::CreateComponent,
                TaskKind::OptimizeCode,
                TaskKind::EnhanceFunctionality,
            ]
            .into_iter()
            .collect(),
            ModelType::Conversational => {
                [TaskKind::CreateConfig, TaskKind::Generic].into_iter().collect()
            }
            ModelType::Analytical => {
                [TaskKind::OptimizeCode, TaskKind::CreateConfig].into_iter().collect()
            }
            ModelType::General => [TaskKind::Generic].into_iter().collect(),
        };
        match size {
            SizeClass::Small => {
                suitable_for.insert(TaskKind::Generic);
            }
            SizeClass::Large => {
                suitable_for.insert(TaskKind::EnhanceFunctionality);
            }
            SizeClass::Medium => {}
        }

        Self {
            model_type,
            size,
            speed_score,
            quality_score,
            suitable_for,
        }
    }
}

/// Authoritative record for one discovered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub key: ModelKey,
    pub estimated_vram_mb: u64,
    pub is_loaded: bool,
    pub is_responsive: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub calls: u64,
    pub errors: u64,
    pub avg_response_ms: f64,
    pub capabilities: ModelCapabilities,
}

impl ModelEntry {
    pub fn new(key: ModelKey, estimated_vram_mb: u64) -> Self {
        let capabilities = ModelCapabilities::infer(&key.model_id);
        Self {
            key,
            estimated_vram_mb,
            is_loaded: false,
            is_responsive: false,
            last_checked: None,
            last_used: None,
            last_seen: Utc::now(),
            calls: 0,
            errors: 0,
            avg_response_ms: 0.0,
            capabilities,
        }
    }

    /// Observed success ratio; a model with no calls yet counts as clean.
    pub fn success_ratio(&self) -> f64 {
        if self.calls == 0 {
            1.0
        } else {
            1.0 - self.errors as f64 / self.calls as f64
        }
    }

    /// Fold one generation into the rolling stats and touch the LRU clock.
    pub fn record_call(&mut self, elapsed_ms: u64, success: bool) {
        self.fold_sample(elapsed_ms, success);
        self.last_used = Some(Utc::now());
    }

    /// Fold a probe into the rolling stats. Probes deliberately leave
    /// `last_used` alone so they cannot skew eviction order.
    pub fn record_probe(&mut self, elapsed_ms: u64, success: bool) {
        self.fold_sample(elapsed_ms, success);
        self.last_checked = Some(Utc::now());
    }

    fn fold_sample(&mut self, elapsed_ms: u64, success: bool) {
        self.calls += 1;
        if !success {
            self.errors += 1;
        } else if self.calls == 1 {
            self.avg_response_ms = elapsed_ms as f64;
        } else {
            let n = self.calls as f64;
            self.avg_response_ms = (self.avg_response_ms * (n - 1.0) + elapsed_ms as f64) / n;
        }
    }
}
