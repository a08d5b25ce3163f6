//! Consensus engine: sequences phases per round, enforces budget and
//! cancellation gates, and decides termination.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::{ChallengeClassifier, LexicalClassifier};
use crate::config::ConclaveConfig;
use crate::convergence::ConvergenceDetector;
use crate::cost::{CostGovernor, SharedCostGovernor};
use crate::error::ConsensusError;
use crate::events::{EventBus, RunEvent, SharedEventBus};
use crate::registry::{CapabilityRegistry, ModelProfile, ModelRef};
use crate::selector::ModelSelector;
use crate::storage::{NoopTranscriptStore, TranscriptStore};
use crate::telemetry::RunSummary;

use super::phases::{ConfidencePolicy, PhaseRunner};
use super::state::{Phase, RunContext};

/// A failed run, carrying the reason and whatever history committed before
/// the failure. Callers never receive a silent partial success.
#[derive(Debug)]
pub struct RunFailure {
    pub reason: ConsensusError,
    pub context: RunContext,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {} failed after {} round(s): {}",
            self.context.id,
            self.context.rounds.len(),
            self.reason
        )
    }
}

impl std::error::Error for RunFailure {}

/// Why a run stopped looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Converged,
    MaxRounds,
}

/// Race a future against the cancel signal. Cancellation wins by dropping
/// the future, which aborts every provider call in flight inside it.
pub(crate) async fn abort_on_cancel<T, F>(
    cancel: &watch::Receiver<bool>,
    fut: F,
) -> Result<T, ConsensusError>
where
    F: Future<Output = Result<T, ConsensusError>>,
{
    if *cancel.borrow() {
        return Err(ConsensusError::Cancelled);
    }
    let mut cancel = cancel.clone();
    tokio::pin!(fut);
    loop {
        tokio::select! {
            result = &mut fut => return result,
            changed = cancel.changed() => {
                if changed.is_err() {
                    // Sender dropped; cancellation can no longer arrive.
                    break;
                }
                if *cancel.borrow() {
                    return Err(ConsensusError::Cancelled);
                }
            }
        }
    }
    fut.await
}

/// Drives one consensus run to completion. Owns its RunContext exclusively;
/// collaborators are shared by Arc so nested subtask runs can reuse the
/// governor, bus, and cancel signal.
pub struct ConsensusEngine {
    phases: PhaseRunner,
    selector: ModelSelector,
    detector: ConvergenceDetector,
    config: ConclaveConfig,
    cancel: watch::Receiver<bool>,
}

impl ConsensusEngine {
    /// Build an engine with default collaborators: fresh governor, fresh
    /// bus, lexical classifier, no persistence.
    pub fn new(registry: Arc<dyn CapabilityRegistry>, config: ConclaveConfig) -> Self {
        let (_, cancel) = watch::channel(false);
        let governor =
            CostGovernor::new(config.cost.warn_threshold, config.cost.hard_limit).shared();
        Self::with_collaborators(
            registry,
            config,
            governor,
            EventBus::new().shared(),
            Arc::new(NoopTranscriptStore),
            Arc::new(LexicalClassifier::new()),
            cancel,
        )
    }

    /// Build an engine with explicit collaborators. Used directly for nested
    /// subtask runs, which share the parent's governor, bus, and cancel
    /// signal but get their own context.
    pub fn with_collaborators(
        registry: Arc<dyn CapabilityRegistry>,
        config: ConclaveConfig,
        governor: SharedCostGovernor,
        events: SharedEventBus,
        store: Arc<dyn TranscriptStore>,
        classifier: Arc<dyn ChallengeClassifier>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let detector = ConvergenceDetector::new(config.consensus.convergence_threshold);
        Self {
            phases: PhaseRunner {
                registry,
                governor,
                events,
                store,
                classifier,
                config: config.consensus.clone(),
                policy: ConfidencePolicy::default(),
            },
            selector: ModelSelector,
            detector,
            config,
            cancel,
        }
    }

    /// Override the confidence policy.
    pub fn with_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.phases.policy = policy;
        self
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.phases.events
    }

    pub fn governor(&self) -> &SharedCostGovernor {
        &self.phases.governor
    }

    /// Run the debate protocol on a question.
    pub async fn run(&self, question: &str) -> Result<RunContext, RunFailure> {
        let mut ctx = RunContext::new(question, self.config.consensus.max_rounds);
        info!(run_id = %ctx.id, max_rounds = ctx.max_rounds, "Consensus run started");

        match self.drive(&mut ctx).await {
            Ok(()) => {
                self.phases.events.publish(RunEvent::RunCompleted {
                    run_id: ctx.id.clone(),
                    decision: ctx.decision.clone().unwrap_or_default(),
                    confidence: ctx.confidence,
                    cost: ctx.total_cost,
                    timestamp: Utc::now(),
                });
                RunSummary::from_context(&ctx).emit();
                Ok(ctx)
            }
            Err(reason) => {
                let message = reason.to_string();
                // A guard refusing Failed→Failed is the only way this errs.
                if let Err(e) = ctx.fail(&message) {
                    debug!("Run already terminal: {e}");
                }
                self.phases.events.publish(RunEvent::RunFailed {
                    run_id: ctx.id.clone(),
                    message,
                    timestamp: Utc::now(),
                });
                RunSummary::from_context(&ctx).emit();
                Err(RunFailure {
                    reason,
                    context: ctx,
                })
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext) -> Result<(), ConsensusError> {
        let thread_id = match self.phases.store.create_thread(&ctx.question).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to create transcript thread: {e}");
                ctx.id.clone()
            }
        };

        loop {
            self.check_cancelled()?;
            self.phases.governor.check_budget()?;

            let pool = self.healthy_pool().await;
            let proposer = self.selector.select_proposer(&pool)?;
            let challengers = self.selector.select_challengers(
                &pool,
                &proposer,
                self.config.consensus.challenger_strategy,
                self.config.consensus.min_challengers,
                ctx.current_round() + 1,
            )?;
            let profiles: HashMap<ModelRef, ModelProfile> =
                pool.iter().map(|p| (p.model.clone(), p.clone())).collect();

            let previous_revision = ctx.last_round().and_then(|r| r.revision.clone());
            let previous_challenge_text = ctx.last_round().map(|r| r.challenge_text());

            let record = ctx.begin_round(proposer)?;
            record.challengers = challengers;
            let round_number = ctx.current_round();
            let round_id = match self
                .phases
                .store
                .create_round(&thread_id, round_number)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(round = round_number, "Failed to create transcript round: {e}");
                    format!("{thread_id}/{round_number}")
                }
            };

            abort_on_cancel(
                &self.cancel,
                self.phases
                    .run_propose(ctx, &round_id, &profiles, previous_revision),
            )
            .await?;

            self.phases.governor.check_budget()?;
            ctx.transition(Phase::Challenge, "proposal recorded")?;
            abort_on_cancel(
                &self.cancel,
                self.phases.run_challenge(ctx, &round_id, &profiles),
            )
            .await?;

            self.phases.governor.check_budget()?;
            ctx.transition(Phase::Revise, "challenges collected")?;
            abort_on_cancel(
                &self.cancel,
                self.phases.run_revise(ctx, &round_id, &profiles),
            )
            .await?;

            ctx.transition(Phase::Commit, "revision recorded")?;
            self.phases.run_commit(ctx, &round_id).await?;

            let current_text = ctx.last_round().map(|r| r.challenge_text()).unwrap_or_default();
            let check = self
                .detector
                .check(previous_challenge_text.as_deref(), &current_text);
            debug!(
                round = round_number,
                similarity = check.similarity,
                converged = check.converged,
                "Convergence check"
            );

            let stop = if check.converged {
                Some(StopReason::Converged)
            } else if !ctx.has_rounds_remaining() {
                Some(StopReason::MaxRounds)
            } else {
                None
            };

            if let Some(reason) = stop {
                self.finalize(ctx, reason)?;
                return Ok(());
            }

            // Budget gate before committing to another round.
            self.check_cancelled()?;
            self.phases.governor.check_budget()?;
        }
    }

    /// Registered models that currently pass a health check.
    async fn healthy_pool(&self) -> Vec<ModelProfile> {
        let models = self.phases.registry.list_models().await;
        let checks = models.iter().map(|profile| {
            let model = profile.model.clone();
            async move { self.phases.registry.health_check(&model).await }
        });
        let healthy = join_all(checks).await;
        models
            .into_iter()
            .zip(healthy)
            .filter_map(|(profile, ok)| {
                if !ok {
                    warn!(model = %profile.model, "Model failed health check, excluded from pool");
                }
                ok.then_some(profile)
            })
            .collect()
    }

    fn check_cancelled(&self) -> Result<(), ConsensusError> {
        if *self.cancel.borrow() {
            return Err(ConsensusError::Cancelled);
        }
        Ok(())
    }

    fn finalize(&self, ctx: &mut RunContext, reason: StopReason) -> Result<(), ConsensusError> {
        let (decision, confidence, dissent) = match ctx.last_round() {
            Some(record) => (
                record.revision.clone(),
                record.confidence,
                record.dissent.clone(),
            ),
            None => (None, 0.0, None),
        };
        ctx.decision = decision;
        ctx.confidence = confidence;
        ctx.dissent = dissent;

        let note = match reason {
            StopReason::Converged => "challenges converged",
            StopReason::MaxRounds => "max rounds reached",
        };
        ctx.transition(Phase::Complete, note)?;
        info!(
            run_id = %ctx.id,
            rounds = ctx.rounds.len(),
            confidence = ctx.confidence,
            cost = ctx.total_cost,
            note,
            "Consensus run complete"
        );
        Ok(())
    }
}
