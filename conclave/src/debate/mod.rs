//! Debate protocol: state machine, phase handlers, and the engine that
//! sequences them.

pub mod engine;
pub mod phases;
pub mod state;

pub use engine::{ConsensusEngine, RunFailure};
pub use phases::{challenge_coverage, ConfidencePolicy, PhaseRunner};
pub use state::{
    ChallengeEntry, Phase, PhaseTransition, RoundRecord, RunContext, RunStatus, TransitionError,
};
