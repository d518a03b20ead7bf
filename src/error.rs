//! Error taxonomy for the fleet runtime
//!
//! Components return structured errors across their boundaries; the agent
//! runtime is the only layer that converts these into task outcomes.

use thiserror::Error;

/// Structured error kinds shared by every subsystem.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A deadline elapsed on a network call or lease wait.
    #[error("deadline of {0} ms exceeded")]
    Timeout(u128),

    /// A provider endpoint is unreachable or refused the request.
    #[error("provider '{provider}' unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    /// The provider cannot load models programmatically; an operator must act.
    #[error("model '{model}' must be loaded manually on provider '{provider}'")]
    ManualLoadRequired { provider: String, model: String },

    /// Loading the model would exceed the VRAM budget.
    #[error("loading '{model}' ({needed_mb} MB) would exceed the {budget_mb} MB VRAM budget")]
    OverBudget {
        model: String,
        needed_mb: u64,
        budget_mb: u64,
    },

    /// A file lease could not be acquired, or a write raced a foreign holder.
    #[error("could not hold lease on '{path}': {reason}")]
    Locked { path: String, reason: String },

    /// A provider answered with a body missing the expected fields.
    #[error("malformed response from provider '{provider}': {detail}")]
    Malformed { provider: String, detail: String },

    /// Configuration is unusable or the persistence layer is unwritable.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FleetError {
    pub fn unavailable(provider: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn locked(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Locked {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is recoverable by falling back locally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FleetError::Fatal(_))
    }
}

pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = FleetError::OverBudget {
            model: "ollama/llama3:70b".to_string(),
            needed_mb: 40000,
            budget_mb: 7000,
        };
        let msg = err.to_string();
        assert!(msg.contains("40000"));
        assert!(msg.contains("7000"));
    }

    #[test]
    fn test_fatal_is_not_recoverable() {
        assert!(!FleetError::Fatal("bad config".into()).is_recoverable());
        assert!(FleetError::Timeout(25_000).is_recoverable());
    }
}
