//! Agent runtime
//!
//! Role definitions, the read-only work source, bounded project analysis,
//! and the cooperative per-agent loop.

pub mod analysis;
pub mod runtime;
pub mod work;

use serde::{Deserialize, Serialize};

use crate::fleet::ModelType;

pub use analysis::{ProjectAnalysis, ProjectAnalyzer};
pub use runtime::AgentRuntime;
pub use work::{InMemoryWorkSource, Task, TaskKind, WorkSource};

/// The specialized roles this runtime drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Architect,
    Backend,
    Frontend,
    Qa,
    Orchestrator,
}

impl AgentRole {
    /// Model types this role works best with; used as a selection bonus.
    pub fn preferred_model_types(&self) -> &'static [ModelType] {
        match self {
            AgentRole::Architect | AgentRole::Qa | AgentRole::Orchestrator => {
                &[ModelType::Analytical, ModelType::Conversational]
            }
            AgentRole::Backend | AgentRole::Frontend => &[ModelType::Coding],
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Architect => write!(f, "architect"),
            AgentRole::Backend => write!(f, "backend"),
            AgentRole::Frontend => write!(f, "frontend"),
            AgentRole::Qa => write!(f, "qa"),
            AgentRole::Orchestrator => write!(f, "orchestrator"),
        }
    }
}
