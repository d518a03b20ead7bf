//! Runtime configuration
//!
//! Loaded once at startup from YAML. Enumerates providers, per-role model
//! assignments, and the agents to spawn. A missing file falls back to a
//! built-in local setup; a broken file is fatal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::agent::AgentRole;
use crate::error::{FleetError, FleetResult};

/// Wire protocol spoken by a provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-style `/v1/chat/completions` (LM Studio and friends).
    OpenaiChat,
    /// Ollama's native `/api/generate` protocol.
    OllamaNative,
    /// OpenAI-style `/v1/completions`, used by shared vLLM deployments.
    OpenaiCompletions,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenaiChat => write!(f, "openai_chat"),
            ProviderKind::OllamaNative => write!(f, "ollama_native"),
            ProviderKind::OpenaiCompletions => write!(f, "openai_completions"),
        }
    }
}

/// Endpoint path overrides for a provider. Unset paths fall back to the
/// defaults of the provider's wire protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    pub models: Option<String>,
    pub chat: Option<String>,
    pub generate: Option<String>,
    pub load: Option<String>,
    pub unload: Option<String>,
}

/// One backing LLM server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub kind: ProviderKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub can_load: bool,
    #[serde(default)]
    pub can_unload: bool,
    #[serde(default = "default_one")]
    pub max_concurrent_models: u32,
    #[serde(default = "default_memory_limit_gb")]
    pub memory_limit_gb: u32,
    #[serde(default)]
    pub endpoints: ProviderEndpoints,
}

/// Preferred models for one agent role, as `provider/model` references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleAssignment {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub fallback: Vec<String>,
}

/// One agent to spawn at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub role: AgentRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_max_vram_mb")]
    pub max_vram_mb: u64,
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub agent_assignments: BTreeMap<AgentRole, RoleAssignment>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default = "default_run_hours")]
    pub run_hours: f64,
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_memory_limit_gb() -> u32 {
    6
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_vram_mb() -> u64 {
    7000
}

fn default_run_hours() -> f64 {
    8.0
}

impl FleetConfig {
    /// Load configuration from `path`, falling back to [`FleetConfig::local_default`]
    /// when the file does not exist. A present-but-unparseable file is fatal.
    pub fn load(path: impl AsRef<Path>) -> FleetResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file missing, using built-in local defaults");
            return Ok(Self::local_default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Fatal(format!("cannot read config {}: {e}", path.display())))?;
        let mut config: FleetConfig = serde_yaml::from_str(&raw)
            .map_err(|e| FleetError::Fatal(format!("cannot parse config {}: {e}", path.display())))?;

        config.validate()?;
        info!(
            providers = config.enabled_providers().count(),
            agents = config.agents.len(),
            max_vram_mb = config.max_vram_mb,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Built-in configuration for a typical single-host local setup:
    /// LM Studio on :1234 (GUI-managed loads) and Ollama on :11434.
    pub fn local_default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "lmstudio".to_string(),
            ProviderConfig {
                base_url: "http://localhost:1234".to_string(),
                kind: ProviderKind::OpenaiChat,
                enabled: true,
                can_load: false,
                can_unload: true,
                max_concurrent_models: 1,
                memory_limit_gb: 6,
                endpoints: ProviderEndpoints::default(),
            },
        );
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                base_url: "http://127.0.0.1:11434".to_string(),
                kind: ProviderKind::OllamaNative,
                enabled: true,
                can_load: true,
                can_unload: true,
                max_concurrent_models: 2,
                memory_limit_gb: 6,
                endpoints: ProviderEndpoints::default(),
            },
        );

        let mut agent_assignments = BTreeMap::new();
        agent_assignments.insert(
            AgentRole::Architect,
            RoleAssignment {
                primary: vec!["lmstudio/mistral-small-3.1-24b-instruct-2503".to_string()],
                fallback: vec!["ollama/llama3.2:3b".to_string()],
            },
        );
        agent_assignments.insert(
            AgentRole::Backend,
            RoleAssignment {
                primary: vec!["lmstudio/codellama-7b-instruct".to_string()],
                fallback: vec!["ollama/qwen2.5-coder:7b".to_string()],
            },
        );
        agent_assignments.insert(
            AgentRole::Frontend,
            RoleAssignment {
                primary: vec!["lmstudio/codellama-7b-instruct".to_string()],
                fallback: vec![],
            },
        );
        agent_assignments.insert(
            AgentRole::Qa,
            RoleAssignment {
                primary: vec!["lmstudio/mistral-small-3.1-24b-instruct-2503".to_string()],
                fallback: vec![],
            },
        );
        agent_assignments.insert(
            AgentRole::Orchestrator,
            RoleAssignment {
                primary: vec!["lmstudio/mistral-small-3.1-24b-instruct-2503".to_string()],
                fallback: vec![],
            },
        );

        Self {
            workspace_root: default_workspace_root(),
            max_vram_mb: default_max_vram_mb(),
            providers,
            agent_assignments,
            agents: vec![
                AgentSpec {
                    id: "architect-1".to_string(),
                    role: AgentRole::Architect,
                },
                AgentSpec {
                    id: "backend-1".to_string(),
                    role: AgentRole::Backend,
                },
            ],
            run_hours: default_run_hours(),
        }
    }

    /// Enabled providers, in deterministic name order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&String, &ProviderConfig)> {
        self.providers.iter().filter(|(_, p)| p.enabled)
    }

    /// Check invariants and prune assignments that reference disabled or
    /// unknown providers. Each dropped assignment is logged once.
    pub fn validate(&mut self) -> FleetResult<()> {
        if self.enabled_providers().next().is_none() {
            return Err(FleetError::Fatal(
                "configuration enables no providers".to_string(),
            ));
        }
        if self.max_vram_mb == 0 {
            return Err(FleetError::Fatal("max_vram_mb must be non-zero".to_string()));
        }

        let providers = &self.providers;
        for (role, assignment) in self.agent_assignments.iter_mut() {
            for list in [&mut assignment.primary, &mut assignment.fallback] {
                list.retain(|entry| {
                    match split_model_ref(entry) {
                        (Some(provider), _) => {
                            let ok = providers.get(provider).map(|p| p.enabled).unwrap_or(false);
                            if !ok {
                                warn!(
                                    %role,
                                    assignment = %entry,
                                    "dropping assignment: provider disabled or unknown"
                                );
                            }
                            ok
                        }
                        // Unqualified references resolve against any provider later.
                        (None, _) => true,
                    }
                });
            }
        }
        Ok(())
    }
}

/// Split a `provider/model` reference. The model id itself may contain
/// slashes (vLLM ids often do), so only the first segment is the provider.
pub fn split_model_ref(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('/') {
        Some((provider, model)) if !provider.is_empty() => (Some(provider), model),
        _ => (None, reference),
    }
}
