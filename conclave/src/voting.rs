//! Voting protocol: parallel independent answers plus a meta-judge.
//!
//! Unlike the debate protocol there is no forced disagreement and no round
//! loop; every eligible model answers once and the highest-capability model
//! judges. Shares the selector and cost governor with the debate engine.

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{AggregationMode, ConclaveConfig};
use crate::cost::{CostGovernor, SharedCostGovernor};
use crate::debate::engine::{abort_on_cancel, RunFailure};
use crate::debate::state::RunContext;
use crate::error::{ConsensusError, ProviderError};
use crate::events::{EventBus, RunEvent, SharedEventBus};
use crate::prompts;
use crate::registry::{CapabilityRegistry, Completion, ModelProfile, ModelRef, SendRequest};
use crate::selector::ModelSelector;
use crate::storage::{ContributionRole, NoopTranscriptStore, TranscriptStore};

/// Minimum successful respondents for a valid vote.
const MIN_RESPONDENTS: usize = 2;

/// Confidence assigned when the judge's reply cannot be parsed.
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// One model's independent answer.
#[derive(Debug, Clone)]
pub struct BallotEntry {
    pub model: ModelRef,
    pub answer: String,
    /// Capability proxy (output cost per million) used as vote weight.
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
struct MajorityVerdict {
    winner: usize,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct WeightedVerdict {
    answer: String,
    confidence: f64,
}

/// Single-round alternative to the debate engine.
pub struct VotingAggregator {
    registry: Arc<dyn CapabilityRegistry>,
    config: ConclaveConfig,
    governor: SharedCostGovernor,
    events: SharedEventBus,
    store: Arc<dyn TranscriptStore>,
    cancel: watch::Receiver<bool>,
    selector: ModelSelector,
}

impl VotingAggregator {
    /// Build an aggregator with default collaborators.
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
            cancel,
        )
    }

    pub fn with_collaborators(
        registry: Arc<dyn CapabilityRegistry>,
        config: ConclaveConfig,
        governor: SharedCostGovernor,
        events: SharedEventBus,
        store: Arc<dyn TranscriptStore>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            config,
            governor,
            events,
            store,
            cancel,
            selector: ModelSelector,
        }
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn governor(&self) -> &SharedCostGovernor {
        &self.governor
    }

    /// Run one vote on a question.
    pub async fn run(&self, question: &str) -> Result<RunContext, RunFailure> {
        let mut ctx = RunContext::new(question, 1);
        info!(run_id = %ctx.id, aggregation = %self.config.voting.aggregation, "Voting run started");

        match self.drive(&mut ctx).await {
            Ok(()) => {
                self.events.publish(RunEvent::RunCompleted {
                    run_id: ctx.id.clone(),
                    decision: ctx.decision.clone().unwrap_or_default(),
                    confidence: ctx.confidence,
                    cost: ctx.total_cost,
                    timestamp: Utc::now(),
                });
                Ok(ctx)
            }
            Err(reason) => {
                let message = reason.to_string();
                if let Err(e) = ctx.fail(&message) {
                    debug!("Run already terminal: {e}");
                }
                self.events.publish(RunEvent::RunFailed {
                    run_id: ctx.id.clone(),
                    message,
                    timestamp: Utc::now(),
                });
                Err(RunFailure {
                    reason,
                    context: ctx,
                })
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext) -> Result<(), ConsensusError> {
        self.check_cancelled()?;
        self.governor.check_budget()?;

        let pool = self.healthy_pool().await;
        if pool.len() < MIN_RESPONDENTS {
            return Err(ConsensusError::InsufficientModels {
                needed: MIN_RESPONDENTS,
                available: pool.len(),
            });
        }
        let judge = self.selector.select_judge(&pool)?;
        let profiles: HashMap<ModelRef, ModelProfile> =
            pool.iter().map(|p| (p.model.clone(), p.clone())).collect();

        // Fan out to every respondent; failures are dropped.
        let question = ctx.question.clone();
        let calls = pool.iter().map(|profile| {
            let model = profile.model.clone();
            let weight = profile.output_cost_per_million;
            let question = question.clone();
            async move {
                let result = self.timed_send(&model, &question).await;
                (model, weight, result)
            }
        });
        let results = abort_on_cancel(&self.cancel, async {
            Ok::<_, ConsensusError>(join_all(calls).await)
        })
        .await?;

        let mut ballots = Vec::new();
        for (model, weight, result) in results {
            match result {
                Ok(completion) => {
                    self.account(ctx, &profiles, &model, ContributionRole::Respondent, &completion)
                        .await;
                    ballots.push(BallotEntry {
                        model,
                        answer: completion.content,
                        weight,
                    });
                }
                Err(e) => warn!(respondent = %model, "Respondent dropped from vote: {e}"),
            }
        }

        if ballots.len() < MIN_RESPONDENTS {
            return Err(ConsensusError::InsufficientModels {
                needed: MIN_RESPONDENTS,
                available: ballots.len(),
            });
        }

        self.check_cancelled()?;
        self.governor.check_budget()?;

        let (decision, confidence) = match self.config.voting.aggregation {
            AggregationMode::Majority => {
                self.judge_majority(ctx, &profiles, &judge, &ballots).await?
            }
            AggregationMode::Weighted => {
                self.judge_weighted(ctx, &profiles, &judge, &ballots).await?
            }
        };

        ctx.decision = Some(decision);
        ctx.confidence = confidence.clamp(0.0, 1.0);
        ctx.finish("votes aggregated")?;
        info!(
            run_id = %ctx.id,
            respondents = ballots.len(),
            confidence = ctx.confidence,
            "Voting run complete"
        );
        Ok(())
    }

    /// Judge picks one respondent's answer as final.
    async fn judge_majority(
        &self,
        ctx: &mut RunContext,
        profiles: &HashMap<ModelRef, ModelProfile>,
        judge: &ModelRef,
        ballots: &[BallotEntry],
    ) -> Result<(String, f64), ConsensusError> {
        let listing: Vec<(String, String)> = ballots
            .iter()
            .map(|b| (b.model.to_string(), b.answer.clone()))
            .collect();
        let prompt = prompts::majority_judge_prompt(&ctx.question, &listing);
        let completion = abort_on_cancel(&self.cancel, async {
            self.timed_send(judge, &prompt)
                .await
                .map_err(ConsensusError::Provider)
        })
        .await?;
        self.account(ctx, profiles, judge, ContributionRole::Judge, &completion)
            .await;

        match extract_json::<MajorityVerdict>(&completion.content) {
            Some(verdict) if verdict.winner < ballots.len() => {
                Ok((ballots[verdict.winner].answer.clone(), verdict.confidence))
            }
            _ => {
                // Documented fallback: first respondent wins at low confidence.
                warn!(judge = %judge, "Unparseable majority verdict, falling back to first ballot");
                Ok((ballots[0].answer.clone(), FALLBACK_CONFIDENCE))
            }
        }
    }

    /// Judge synthesizes a merged answer weighted by capability proxy.
    async fn judge_weighted(
        &self,
        ctx: &mut RunContext,
        profiles: &HashMap<ModelRef, ModelProfile>,
        judge: &ModelRef,
        ballots: &[BallotEntry],
    ) -> Result<(String, f64), ConsensusError> {
        let listing: Vec<(String, String, f64)> = ballots
            .iter()
            .map(|b| (b.model.to_string(), b.answer.clone(), b.weight))
            .collect();
        let prompt = prompts::weighted_judge_prompt(&ctx.question, &listing);
        let completion = abort_on_cancel(&self.cancel, async {
            self.timed_send(judge, &prompt)
                .await
                .map_err(ConsensusError::Provider)
        })
        .await?;
        self.account(ctx, profiles, judge, ContributionRole::Judge, &completion)
            .await;

        match extract_json::<WeightedVerdict>(&completion.content) {
            Some(verdict) => Ok((verdict.answer, verdict.confidence)),
            None => {
                // Documented fallback: the judge's raw text stands as the
                // synthesis, at low confidence.
                warn!(judge = %judge, "Unparseable weighted verdict, using raw judge text");
                Ok((completion.content.clone(), FALLBACK_CONFIDENCE))
            }
        }
    }

    async fn timed_send(
        &self,
        model: &ModelRef,
        prompt: &str,
    ) -> Result<Completion, ProviderError> {
        let timeout = Duration::from_secs(self.config.consensus.request_timeout_secs);
        let request = SendRequest::from_prompt(prompt);
        match tokio::time::timeout(timeout, self.registry.send(model, request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                model: model.to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Record spend and transcript for one successful call.
    async fn account(
        &self,
        ctx: &mut RunContext,
        profiles: &HashMap<ModelRef, ModelProfile>,
        model: &ModelRef,
        role: ContributionRole,
        completion: &Completion,
    ) {
        if let Some(profile) = profiles.get(model) {
            let (cost, crossed_warn) = self.governor.record(profile, completion.usage);
            ctx.record_usage(completion.usage, cost);
            if crossed_warn {
                self.events.publish(RunEvent::BudgetWarning {
                    run_id: ctx.id.clone(),
                    spent: self.governor.totals().cost,
                    threshold: self.governor.warn_threshold(),
                    timestamp: Utc::now(),
                });
            }
            if let Err(e) = self
                .store
                .add_contribution(&ctx.id, model, role, &completion.content, completion.usage, cost)
                .await
            {
                warn!(%model, role = %role, "Failed to persist contribution: {e}");
            }
        }
    }

    async fn healthy_pool(&self) -> Vec<ModelProfile> {
        let models = self.registry.list_models().await;
        let checks = models.iter().map(|profile| {
            let model = profile.model.clone();
            async move { self.registry.health_check(&model).await }
        });
        let healthy = join_all(checks).await;
        models
            .into_iter()
            .zip(healthy)
            .filter_map(|(profile, ok)| ok.then_some(profile))
            .collect()
    }

    fn check_cancelled(&self) -> Result<(), ConsensusError> {
        if *self.cancel.borrow() {
            return Err(ConsensusError::Cancelled);
        }
        Ok(())
    }
}

/// Pull the first JSON object out of model output, tolerating fences and
/// surrounding prose.
fn extract_json<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
