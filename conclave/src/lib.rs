//! Multi-model consensus orchestration.
//!
//! Several independent reasoning providers jointly produce a vetted answer
//! to a question through a structured debate protocol, instead of trusting
//! a single model's raw output.
//!
//! # Protocols
//!
//! - **Consensus** ([`ConsensusEngine`]): rounds of propose, challenge,
//!   revise, commit until challenges converge, the budget runs out, or
//!   `max_rounds` is reached.
//! - **Voting** ([`VotingAggregator`]): one round of parallel independent
//!   answers aggregated by a meta-judge.
//! - **Decomposition** ([`DecompositionScheduler`]): split a question into
//!   a dependency graph of subtasks, run either protocol per node with
//!   dependency-driven concurrency, then synthesize.
//!
//! # Collaborators
//!
//! Providers sit behind [`CapabilityRegistry`]; transcripts flow out through
//! [`TranscriptStore`]; real-time consumers subscribe to the [`EventBus`].
//! Every run carries its own [`CostGovernor`], shared only with its nested
//! subtask runs.

pub mod classifier;
pub mod config;
pub mod convergence;
pub mod cost;
pub mod debate;
pub mod decompose;
pub mod error;
pub mod events;
pub mod prompts;
pub mod registry;
pub mod selector;
pub mod storage;
pub mod telemetry;
pub mod voting;

// Re-export key protocol types
pub use debate::{
    ChallengeEntry, ConfidencePolicy, ConsensusEngine, Phase, PhaseTransition, RoundRecord,
    RunContext, RunFailure, RunStatus, TransitionError,
};

// Re-export collaborator seams
pub use classifier::{ChallengeClassifier, Classification, LexicalClassifier};
pub use registry::{
    CapabilityRegistry, ChatMessage, Completion, ModelProfile, ModelRef, Role, SendRequest,
    TokenUsage,
};
pub use storage::{ContributionRole, NoopTranscriptStore, TranscriptStore};

// Re-export selection, budget, and convergence types
pub use convergence::{jaccard_similarity, ConvergenceCheck, ConvergenceDetector};
pub use cost::{CostGovernor, LedgerEntry, LedgerTotals, SharedCostGovernor};
pub use selector::ModelSelector;

// Re-export decomposition and voting types
pub use decompose::{
    parse_subtask_plan, Decomposer, DecompositionScheduler, RegistryDecomposer, SubtaskGraph,
    SubtaskNode, SubtaskProtocol, SubtaskSpec, SubtaskStatus,
};
pub use voting::{BallotEntry, VotingAggregator};

// Re-export configuration and errors
pub use config::{
    AggregationMode, ChallengerStrategy, ConclaveConfig, ConfigError, ConsensusSection,
    CostSection, DecomposeSection, VotingSection,
};
pub use error::{ConsensusError, DecompositionError, ProviderError};

// Re-export event types
pub use events::{EventBus, EventBusExt, EventFilter, FilteredReceiver, RunEvent, SharedEventBus};

// Re-export telemetry helpers
pub use telemetry::{init_tracing, RunSummary};
