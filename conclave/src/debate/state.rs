//! Consensus state machine: phases, transition guards, and run tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{ModelRef, TokenUsage};

/// Phase of a consensus run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Run created but not started.
    Idle,
    /// Proposer is producing the answer-in-progress.
    Propose,
    /// Challengers are attacking the proposal.
    Challenge,
    /// Proposer is incorporating genuine challenges.
    Revise,
    /// Round confidence and dissent are being finalized.
    Commit,
    /// Run finished with a decision.
    Complete,
    /// Run terminated by a fatal error or cancellation.
    Failed,
}

impl Phase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Valid transitions from this phase. `Failed` is reachable from every
    /// non-terminal phase.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Idle => &[Self::Propose, Self::Failed],
            Self::Propose => &[Self::Challenge, Self::Failed],
            Self::Challenge => &[Self::Revise, Self::Failed],
            Self::Revise => &[Self::Commit, Self::Failed],
            Self::Commit => &[Self::Propose, Self::Complete, Self::Failed],
            Self::Complete | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Propose => write!(f, "propose"),
            Self::Challenge => write!(f, "challenge"),
            Self::Revise => write!(f, "revise"),
            Self::Commit => write!(f, "commit"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Error for illegal state transitions. A programming-contract violation,
/// never a recoverable runtime condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// One challenger's recorded response, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeEntry {
    /// Model that produced the challenge.
    pub challenger: ModelRef,
    /// Raw challenge text.
    pub text: String,
    /// Whether the classifier judged this an actual disagreement.
    pub genuine: bool,
    /// Classifier rationale for the label.
    pub rationale: String,
}

/// Record of a single round. Mutated only by the phase handler currently
/// active for that round; frozen once the round commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number (1-indexed).
    pub round: u32,
    /// Model producing this round's proposal.
    pub proposer: ModelRef,
    /// Proposal text, set when propose completes.
    pub proposal: Option<String>,
    /// Models selected to challenge this round.
    pub challengers: Vec<ModelRef>,
    /// Challenge responses in arrival order.
    pub challenges: Vec<ChallengeEntry>,
    /// Model that produced the revision (the proposer).
    pub reviser: ModelRef,
    /// Revision text, set when revise completes.
    pub revision: Option<String>,
    /// Round confidence, set at commit.
    pub confidence: f64,
    /// Strongest unresolved genuine challenge, set at commit.
    pub dissent: Option<String>,
    /// When this round started.
    pub started_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn new(round: u32, proposer: ModelRef) -> Self {
        Self {
            round,
            reviser: proposer.clone(),
            proposer,
            proposal: None,
            challengers: Vec::new(),
            challenges: Vec::new(),
            revision: None,
            confidence: 0.0,
            dissent: None,
            started_at: Utc::now(),
        }
    }

    /// Challenges the classifier judged genuine.
    pub fn genuine_challenges(&self) -> impl Iterator<Item = &ChallengeEntry> {
        self.challenges.iter().filter(|c| c.genuine)
    }

    /// Concatenated challenge text, used by the convergence detector.
    pub fn challenge_text(&self) -> String {
        self.challenges
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Complete,
    Failed { reason: String },
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// State of one consensus run, exclusively owned by the engine driving it.
/// Nested subtask runs get their own context whose result is copied into
/// the parent, never aliased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique run identifier.
    pub id: String,
    /// The question under debate.
    pub question: String,
    /// Maximum rounds allowed.
    pub max_rounds: u32,
    /// Current phase.
    pub phase: Phase,
    /// Committed and in-progress rounds.
    pub rounds: Vec<RoundRecord>,
    /// Transition history.
    pub transitions: Vec<PhaseTransition>,
    /// Final decision text.
    pub decision: Option<String>,
    /// Final confidence in [0,1].
    pub confidence: f64,
    /// Strongest surviving disagreement, if any.
    pub dissent: Option<String>,
    /// Cumulative spend in dollars.
    pub total_cost: f64,
    /// Cumulative token usage.
    pub usage: TokenUsage,
    /// Terminal status.
    pub status: RunStatus,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
}

impl RunContext {
    /// Create a new idle run.
    pub fn new(question: &str, max_rounds: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.to_string(),
            max_rounds,
            phase: Phase::Idle,
            rounds: Vec::new(),
            transitions: Vec::new(),
            decision: None,
            confidence: 0.0,
            dissent: None,
            total_cost: 0.0,
            usage: TokenUsage::default(),
            status: RunStatus::Running,
            created_at: Utc::now(),
        }
    }

    /// Current round number (0 before the first propose).
    pub fn current_round(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// The round currently being built.
    pub fn current_round_mut(&mut self) -> Option<&mut RoundRecord> {
        self.rounds.last_mut()
    }

    /// The most recently committed or in-progress round.
    pub fn last_round(&self) -> Option<&RoundRecord> {
        self.rounds.last()
    }

    /// Transition to a new phase, enforcing edge legality and guards.
    pub fn transition(&mut self, to: Phase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.check_guards(to)?;

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        match to {
            Phase::Complete => self.status = RunStatus::Complete,
            Phase::Failed => {
                self.status = RunStatus::Failed {
                    reason: reason.to_string(),
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Guards beyond edge legality.
    fn check_guards(&self, to: Phase) -> Result<(), TransitionError> {
        match to {
            Phase::Challenge => {
                let has_proposal = self
                    .last_round()
                    .map(|r| r.proposal.is_some())
                    .unwrap_or(false);
                if !has_proposal {
                    return Err(TransitionError {
                        from: self.phase,
                        to,
                        reason: "no proposal recorded for the current round".to_string(),
                    });
                }
            }
            Phase::Commit => {
                let has_challenge = self
                    .last_round()
                    .map(|r| !r.challenges.is_empty())
                    .unwrap_or(false);
                if !has_challenge {
                    return Err(TransitionError {
                        from: self.phase,
                        to,
                        reason: "no challenge recorded for the current round".to_string(),
                    });
                }
            }
            Phase::Propose => {
                if self.current_round() >= self.max_rounds {
                    return Err(TransitionError {
                        from: self.phase,
                        to,
                        reason: format!("max_rounds ({}) reached", self.max_rounds),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Open a new round and enter the propose phase.
    pub fn begin_round(&mut self, proposer: ModelRef) -> Result<&mut RoundRecord, TransitionError> {
        self.transition(Phase::Propose, "round started")?;
        let round = self.current_round() + 1;
        self.rounds.push(RoundRecord::new(round, proposer));
        let idx = self.rounds.len() - 1;
        Ok(&mut self.rounds[idx])
    }

    /// Mark the run failed, preserving committed history. Terminal phases
    /// cannot fail again.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(Phase::Failed, reason)
    }

    /// Mark a single-shot run complete. Voting and decomposition parents do
    /// not pass through the debate phases, so this records the transition
    /// without requiring the Commit edge. Terminal states still refuse it.
    pub fn finish(&mut self, reason: &str) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError {
                from: self.phase,
                to: Phase::Complete,
                reason: "run already terminal".to_string(),
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to: Phase::Complete,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = Phase::Complete;
        self.status = RunStatus::Complete;
        Ok(())
    }

    /// Whether the run has ended.
    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether another round may start.
    pub fn has_rounds_remaining(&self) -> bool {
        self.current_round() < self.max_rounds
    }

    /// Record spend and usage from one provider call.
    pub fn record_usage(&mut self, usage: TokenUsage, cost: f64) {
        self.usage.input_tokens += usage.input_tokens;
        self.usage.output_tokens += usage.output_tokens;
        self.total_cost += cost;
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | confidence {:.2} | ${:.4} spent",
            self.phase,
            self.current_round(),
            self.max_rounds,
            self.confidence,
            self.total_cost
        )
    }
}
