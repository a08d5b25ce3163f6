//! Event types emitted over the run event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::state::Phase;
use crate::registry::ModelRef;

/// Unique identifier for events.
pub type EventId = String;

/// All events observable during a consensus, voting, or decomposition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A phase began executing.
    PhaseStarted {
        run_id: String,
        phase: Phase,
        round: u32,
        models: Vec<ModelRef>,
        timestamp: DateTime<Utc>,
    },

    /// A phase finished.
    PhaseCompleted {
        run_id: String,
        phase: Phase,
        round: u32,
        content: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// One challenger's response was recorded.
    ChallengeRaised {
        run_id: String,
        round: u32,
        model: ModelRef,
        content: String,
        genuine: bool,
        timestamp: DateTime<Utc>,
    },

    /// A round committed its confidence and dissent.
    RoundCommitted {
        run_id: String,
        round: u32,
        confidence: f64,
        dissent: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Spend crossed the configured warn threshold.
    BudgetWarning {
        run_id: String,
        spent: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    },

    /// A subtask node started executing.
    SubtaskStarted {
        run_id: String,
        subtask_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A subtask node finished.
    SubtaskCompleted {
        run_id: String,
        subtask_id: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a final decision.
    RunCompleted {
        run_id: String,
        decision: String,
        confidence: f64,
        cost: f64,
        timestamp: DateTime<Utc>,
    },

    /// The run terminated with a fatal error.
    RunFailed {
        run_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RunEvent::PhaseStarted { timestamp, .. } => *timestamp,
            RunEvent::PhaseCompleted { timestamp, .. } => *timestamp,
            RunEvent::ChallengeRaised { timestamp, .. } => *timestamp,
            RunEvent::RoundCommitted { timestamp, .. } => *timestamp,
            RunEvent::BudgetWarning { timestamp, .. } => *timestamp,
            RunEvent::SubtaskStarted { timestamp, .. } => *timestamp,
            RunEvent::SubtaskCompleted { timestamp, .. } => *timestamp,
            RunEvent::RunCompleted { timestamp, .. } => *timestamp,
            RunEvent::RunFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string (matches serde tag).
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::PhaseStarted { .. } => "phase_started",
            RunEvent::PhaseCompleted { .. } => "phase_completed",
            RunEvent::ChallengeRaised { .. } => "challenge_raised",
            RunEvent::RoundCommitted { .. } => "round_committed",
            RunEvent::BudgetWarning { .. } => "budget_warning",
            RunEvent::SubtaskStarted { .. } => "subtask_started",
            RunEvent::SubtaskCompleted { .. } => "subtask_completed",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// Get the run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::PhaseStarted { run_id, .. } => run_id,
            RunEvent::PhaseCompleted { run_id, .. } => run_id,
            RunEvent::ChallengeRaised { run_id, .. } => run_id,
            RunEvent::RoundCommitted { run_id, .. } => run_id,
            RunEvent::BudgetWarning { run_id, .. } => run_id,
            RunEvent::SubtaskStarted { run_id, .. } => run_id,
            RunEvent::SubtaskCompleted { run_id, .. } => run_id,
            RunEvent::RunCompleted { run_id, .. } => run_id,
            RunEvent::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Generate a new unique event ID.
    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}
