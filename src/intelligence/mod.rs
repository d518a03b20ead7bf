//! Persistent intelligence
//!
//! Per-agent profiles with cross-session learning, plus the shared
//! experience log and keyword memory that let agents learn from each other.

pub mod profile;
pub mod store;

pub use profile::{
    learning_rate, AgentProfile, CollaborationRecord, LearningEvent, TaskRecord, MAX_COLLABORATIONS,
    MAX_INTELLIGENCE, MAX_PATTERNS, MAX_STRATEGIES, MAX_TASK_HISTORY, MIN_INTELLIGENCE,
};
pub use store::{
    Experience, Insight, IntelligenceStore, IntelligenceSummary, MemoryRecord,
    DEFAULT_INSIGHT_AGE, DEFAULT_INSIGHT_LIMIT,
};
