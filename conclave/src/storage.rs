//! Transcript persistence seam.
//!
//! The engine writes through this trait and never reads back; a failing
//! store logs a warning at the call site and the run continues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::registry::{ModelRef, TokenUsage};

/// Role a contribution was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionRole {
    Proposer,
    Challenger,
    Reviser,
    Judge,
    Respondent,
    Synthesizer,
    Decomposer,
}

impl std::fmt::Display for ContributionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposer => write!(f, "proposer"),
            Self::Challenger => write!(f, "challenger"),
            Self::Reviser => write!(f, "reviser"),
            Self::Judge => write!(f, "judge"),
            Self::Respondent => write!(f, "respondent"),
            Self::Synthesizer => write!(f, "synthesizer"),
            Self::Decomposer => write!(f, "decomposer"),
        }
    }
}

/// Write-only transcript store.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Open a thread for a new run. Returns a store-assigned thread id.
    async fn create_thread(&self, question: &str) -> anyhow::Result<String>;

    /// Open a round within a thread. Returns a store-assigned round id.
    async fn create_round(&self, thread_id: &str, round_number: u32) -> anyhow::Result<String>;

    /// Record one model contribution.
    #[allow(clippy::too_many_arguments)]
    async fn add_contribution(
        &self,
        round_id: &str,
        model: &ModelRef,
        role: ContributionRole,
        content: &str,
        usage: TokenUsage,
        cost: f64,
    ) -> anyhow::Result<()>;

    /// Record the final decision for a round or run.
    async fn save_decision(
        &self,
        round_id: &str,
        content: &str,
        confidence: f64,
        dissent: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Store that accepts and discards everything. Default when no persistence
/// backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranscriptStore;

#[async_trait]
impl TranscriptStore for NoopTranscriptStore {
    async fn create_thread(&self, _question: &str) -> anyhow::Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn create_round(&self, thread_id: &str, round_number: u32) -> anyhow::Result<String> {
        Ok(format!("{thread_id}/{round_number}"))
    }

    async fn add_contribution(
        &self,
        _round_id: &str,
        _model: &ModelRef,
        _role: ContributionRole,
        _content: &str,
        _usage: TokenUsage,
        _cost: f64,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn save_decision(
        &self,
        _round_id: &str,
        _content: &str,
        _confidence: f64,
        _dissent: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
