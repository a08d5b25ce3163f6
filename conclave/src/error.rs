//! Error taxonomy: provider-level (per-participant, non-fatal), consensus-level
//! (fatal for the run), and decomposition-level (fatal before dispatch).

use crate::debate::state::TransitionError;

/// Errors from a single provider call. These are absorbed at the phase
/// boundary and only become fatal when the phase drops below quorum.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed for {model}")]
    Auth { model: String },

    #[error("rate limited on {model} (retry after {retry_after_ms}ms)")]
    RateLimited { model: String, retry_after_ms: u64 },

    #[error("call to {model} timed out after {elapsed_ms}ms")]
    Timeout { model: String, elapsed_ms: u64 },

    #[error("provider for {model} is overloaded")]
    Overloaded { model: String },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("transport failure on {model}: {message}")]
    Transport { model: String, message: String },
}

impl ProviderError {
    /// Model the failed call was addressed to.
    pub fn model(&self) -> &str {
        match self {
            Self::Auth { model }
            | Self::RateLimited { model, .. }
            | Self::Timeout { model, .. }
            | Self::Overloaded { model }
            | Self::ModelNotFound { model }
            | Self::Transport { model, .. } => model,
        }
    }
}

/// Fatal run-level errors. A run that hits one of these transitions to
/// `Failed` with committed rounds preserved.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("insufficient models: needed {needed}, only {available} available")]
    InsufficientModels { needed: usize, available: usize },

    #[error("cost limit exceeded: limit ${limit:.4}, spent ${spent:.4}")]
    CostLimitExceeded { limit: f64, spent: f64 },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Decomposition(#[from] DecompositionError),

    #[error("proposer call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Structural errors raised while validating a subtask graph, always
/// before any node is dispatched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecompositionError {
    #[error("subtask graph contains a cycle through '{node}'")]
    CyclicGraph { node: String },

    #[error("subtask count {got} outside bounds {min}..={max}")]
    SubtaskCount { got: usize, min: usize, max: usize },

    #[error("subtask '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("decomposer returned an unusable plan: {message}")]
    InvalidPlan { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_model_accessor() {
        let err = ProviderError::Timeout {
            model: "gpt-huge".to_string(),
            elapsed_ms: 30_000,
        };
        assert_eq!(err.model(), "gpt-huge");
    }

    #[test]
    fn test_cost_limit_message_carries_amounts() {
        let err = ConsensusError::CostLimitExceeded {
            limit: 1.0,
            spent: 1.2345,
        };
        let msg = err.to_string();
        assert!(msg.contains("$1.0000"));
        assert!(msg.contains("$1.2345"));
    }

    #[test]
    fn test_decomposition_error_converts() {
        let err: ConsensusError = DecompositionError::CyclicGraph {
            node: "b".to_string(),
        }
        .into();
        assert!(err.to_string().contains("cycle"));
    }
}
