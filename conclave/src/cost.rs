//! Cost governance: per-call ledger, warn threshold, hard limit.
//!
//! One governor per top-level run, passed explicitly into every phase and
//! shared by nested subtask runs so the limit binds the whole tree. Never a
//! process-wide singleton.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::ConsensusError;
use crate::registry::{ModelProfile, ModelRef, TokenUsage};

/// One provider call's accounting record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub model: ModelRef,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of running totals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
}

#[derive(Debug, Default)]
struct LedgerInner {
    entries: Vec<LedgerEntry>,
    totals: LedgerTotals,
    warned: bool,
}

/// Shared reference to a CostGovernor.
pub type SharedCostGovernor = Arc<CostGovernor>;

/// Accumulates spend across all calls in a run and enforces thresholds.
/// Increments serialize through the internal mutex so concurrent challenge
/// and subtask completions never tear the running total.
#[derive(Debug)]
pub struct CostGovernor {
    warn_threshold: f64,
    hard_limit: f64,
    inner: Mutex<LedgerInner>,
}

impl CostGovernor {
    /// Create a governor. `hard_limit` of 0 disables the limit.
    pub fn new(warn_threshold: f64, hard_limit: f64) -> Self {
        Self {
            warn_threshold,
            hard_limit,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Create a shared reference to this governor.
    pub fn shared(self) -> SharedCostGovernor {
        Arc::new(self)
    }

    /// Dollar cost of one call at the model's rates.
    pub fn call_cost(profile: &ModelProfile, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 * profile.input_cost_per_million / 1e6
            + usage.output_tokens as f64 * profile.output_cost_per_million / 1e6
    }

    /// Record one provider call. Returns the entry's cost and whether this
    /// call crossed the warn threshold (true at most once per governor).
    pub fn record(&self, profile: &ModelProfile, usage: TokenUsage) -> (f64, bool) {
        let cost = Self::call_cost(profile, usage);
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        inner.entries.push(LedgerEntry {
            model: profile.model.clone(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost,
            timestamp: Utc::now(),
        });
        inner.totals.cost += cost;
        inner.totals.input_tokens += usage.input_tokens;
        inner.totals.output_tokens += usage.output_tokens;
        inner.totals.calls += 1;

        let crossed_warn =
            !inner.warned && self.warn_threshold > 0.0 && inner.totals.cost > self.warn_threshold;
        if crossed_warn {
            inner.warned = true;
            warn!(
                spent = inner.totals.cost,
                threshold = self.warn_threshold,
                "Run spend crossed warn threshold"
            );
        }

        (cost, crossed_warn)
    }

    /// Current running totals.
    pub fn totals(&self) -> LedgerTotals {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .totals
    }

    /// All ledger entries recorded so far.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .clone()
    }

    /// Check the hard limit before starting a new phase. An in-flight phase
    /// finishes its dispatched calls; this gate stops the next one.
    pub fn check_budget(&self) -> Result<(), ConsensusError> {
        if self.hard_limit <= 0.0 {
            return Ok(());
        }
        let spent = self.totals().cost;
        if spent > self.hard_limit {
            return Err(ConsensusError::CostLimitExceeded {
                limit: self.hard_limit,
                spent,
            });
        }
        Ok(())
    }

    pub fn warn_threshold(&self) -> f64 {
        self.warn_threshold
    }

    pub fn hard_limit(&self) -> f64 {
        self.hard_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(model: &str, input_rate: f64, output_rate: f64) -> ModelProfile {
        ModelProfile {
            model: ModelRef::new(model),
            display_name: model.to_string(),
            context_window: 128_000,
            input_cost_per_million: input_rate,
            output_cost_per_million: output_rate,
            proposer_eligible: true,
        }
    }

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_call_cost_formula() {
        let p = profile("m", 3.0, 15.0);
        // 1M input at $3/M + 1M output at $15/M.
        let cost = CostGovernor::call_cost(&p, usage(1_000_000, 1_000_000));
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_accumulate() {
        let governor = CostGovernor::new(0.0, 0.0);
        let p = profile("m", 1.0, 2.0);
        governor.record(&p, usage(500_000, 250_000));
        governor.record(&p, usage(100_000, 100_000));

        let totals = governor.totals();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.input_tokens, 600_000);
        assert_eq!(totals.output_tokens, 350_000);
        // 0.5 + 0.5 + 0.1 + 0.2
        assert!((totals.cost - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_warn_fires_exactly_once() {
        let governor = CostGovernor::new(1.0, 0.0);
        let p = profile("m", 0.0, 10.0);

        let (_, warned) = governor.record(&p, usage(0, 50_000)); // $0.50
        assert!(!warned);
        let (_, warned) = governor.record(&p, usage(0, 60_000)); // $1.10 total
        assert!(warned);
        let (_, warned) = governor.record(&p, usage(0, 60_000)); // still over
        assert!(!warned, "warn must not repeat per call");
    }

    #[test]
    fn test_hard_limit_zero_disables() {
        let governor = CostGovernor::new(0.0, 0.0);
        let p = profile("m", 0.0, 1_000_000.0);
        governor.record(&p, usage(0, 1_000_000)); // $1M spent
        assert!(governor.check_budget().is_ok());
    }

    #[test]
    fn test_hard_limit_exceeded() {
        let governor = CostGovernor::new(0.0, 1.0);
        let p = profile("m", 0.0, 10.0);
        governor.record(&p, usage(0, 150_000)); // $1.50

        let err = governor.check_budget().unwrap_err();
        match err {
            ConsensusError::CostLimitExceeded { limit, spent } => {
                assert!((limit - 1.0).abs() < 1e-9);
                assert!((spent - 1.5).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_under_limit_passes() {
        let governor = CostGovernor::new(0.0, 1.0);
        let p = profile("m", 0.0, 10.0);
        governor.record(&p, usage(0, 50_000)); // $0.50
        assert!(governor.check_budget().is_ok());
    }

    #[test]
    fn test_concurrent_increments_serialize() {
        let governor = CostGovernor::new(0.0, 0.0).shared();
        let p = profile("m", 1.0, 1.0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let governor = Arc::clone(&governor);
                let p = p.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        governor.record(&p, usage(1_000, 1_000));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = governor.totals();
        assert_eq!(totals.calls, 800);
        assert_eq!(totals.input_tokens, 800_000);
    }

    #[test]
    fn test_entries_record_model() {
        let governor = CostGovernor::new(0.0, 0.0);
        governor.record(&profile("critic-b", 1.0, 1.0), usage(10, 10));
        let entries = governor.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].model.as_str(), "critic-b");
    }
}
