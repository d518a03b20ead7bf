//! agent_fleet - multi-agent orchestration over a local LLM fleet
//!
//! Drives a pool of role agents (architect, backend, frontend, QA,
//! orchestrator) against heterogeneous local LLM servers on a single
//! VRAM-constrained host:
//! - provider adapters for the OpenAI-chat, Ollama-native, and
//!   OpenAI-completions wire protocols
//! - a fleet manager with discovery, liveness probing, and a VRAM budget
//! - heuristic model selection per (role, task, priority)
//! - a request router with deadlines, FIFO serialization, and fallback
//! - exclusive file leases so concurrent agents never corrupt artifacts
//! - persistent per-agent intelligence with shared experiences

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod intelligence;
pub mod provider;
pub mod report;
pub mod router;
pub mod selector;

// Re-exports for convenience
pub use agent::{AgentRole, AgentRuntime, InMemoryWorkSource, Task, TaskKind, WorkSource};
pub use config::{FleetConfig, ProviderKind};
pub use coordinator::{FileCoordinator, FileOp};
pub use error::{FleetError, FleetResult};
pub use fleet::{FleetManager, ModelEntry, ModelKey, ProviderHandle};
pub use intelligence::{AgentProfile, IntelligenceStore, LearningEvent};
pub use report::{StatusReport, StatusReporter};
pub use router::{fallback_content, RequestRouter, RoutedGeneration};
pub use selector::{ModelSelector, Priority};
