//! Tracing setup and per-run summary emission.

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::debate::state::{RunContext, RunStatus};

/// Initialize the global tracing subscriber. Respects `RUST_LOG`; defaults
/// to `info` for this crate. Safe to call once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("conclave=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Flat per-run summary, emitted as a structured tracing event so external
/// collectors can scrape run outcomes without subscribing to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub rounds: usize,
    pub confidence: f64,
    pub dissent_present: bool,
    pub total_cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunSummary {
    pub fn from_context(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.id.clone(),
            status: match &ctx.status {
                RunStatus::Running => "running".to_string(),
                RunStatus::Complete => "complete".to_string(),
                RunStatus::Failed { reason } => format!("failed: {reason}"),
            },
            rounds: ctx.rounds.len(),
            confidence: ctx.confidence,
            dissent_present: ctx.dissent.is_some(),
            total_cost: ctx.total_cost,
            input_tokens: ctx.usage.input_tokens,
            output_tokens: ctx.usage.output_tokens,
        }
    }

    /// Emit this summary on the `conclave::run_summary` target.
    pub fn emit(&self) {
        info!(
            target: "conclave::run_summary",
            run_id = %self.run_id,
            status = %self.status,
            rounds = self.rounds,
            confidence = self.confidence,
            dissent_present = self.dissent_present,
            total_cost = self.total_cost,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            "run summary"
        );
    }
}
