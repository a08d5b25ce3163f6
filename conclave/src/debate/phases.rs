//! Phase handlers: propose, challenge, revise, commit.
//!
//! All four operate on the run context's current round. Propose and revise
//! are single sequential calls; challenge fans out one concurrent call per
//! challenger. Commit makes no calls at all.

use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::ChallengeClassifier;
use crate::config::ConsensusSection;
use crate::cost::SharedCostGovernor;
use crate::error::{ConsensusError, ProviderError};
use crate::events::{RunEvent, SharedEventBus};
use crate::prompts;
use crate::registry::{CapabilityRegistry, Completion, ModelProfile, ModelRef, SendRequest};
use crate::storage::{ContributionRole, TranscriptStore};

use super::state::{ChallengeEntry, Phase, RunContext, TransitionError};

/// Fraction of a challenge's significant terms that must appear in the
/// revision for the challenge to count as addressed.
const RESOLUTION_COVERAGE: f64 = 0.3;

/// Words shorter than this carry no signal for resolution checking.
const SIGNIFICANT_WORD_LEN: usize = 5;

/// Tunable mapping from challenge outcomes to a round confidence score.
///
/// `confidence = 1 - genuine_weight * (genuine / total) - unresolved_penalty
/// * [any genuine challenge unresolved]`, clamped to [0,1]. All-sycophantic
/// rounds score 1.0; a round where every challenger genuinely disagreed and
/// the revision addressed none of it scores near the floor.
#[derive(Debug, Clone, Copy)]
pub struct ConfidencePolicy {
    pub genuine_weight: f64,
    pub unresolved_penalty: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            genuine_weight: 0.6,
            unresolved_penalty: 0.2,
        }
    }
}

impl ConfidencePolicy {
    pub fn score(&self, genuine: usize, total: usize, any_unresolved: bool) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let genuine_ratio = genuine as f64 / total as f64;
        let penalty = if any_unresolved {
            self.unresolved_penalty
        } else {
            0.0
        };
        (1.0 - self.genuine_weight * genuine_ratio - penalty).clamp(0.0, 1.0)
    }
}

/// Fraction of the challenge's significant terms present in the revision.
pub fn challenge_coverage(challenge: &str, revision: &str) -> f64 {
    let revision_words: HashSet<String> = revision
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let significant: Vec<String> = challenge
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= SIGNIFICANT_WORD_LEN)
        .collect();

    if significant.is_empty() {
        // Nothing substantive to address.
        return 1.0;
    }
    let covered = significant
        .iter()
        .filter(|w| revision_words.contains(*w))
        .count();
    covered as f64 / significant.len() as f64
}

/// Collaborators shared by every phase invocation.
pub struct PhaseRunner {
    pub registry: Arc<dyn CapabilityRegistry>,
    pub governor: SharedCostGovernor,
    pub events: SharedEventBus,
    pub store: Arc<dyn TranscriptStore>,
    pub classifier: Arc<dyn ChallengeClassifier>,
    pub config: ConsensusSection,
    pub policy: ConfidencePolicy,
}

/// Result of one timed, cost-accounted provider call.
pub struct AccountedCall {
    pub model: ModelRef,
    pub completion: Completion,
    pub cost: f64,
}

impl PhaseRunner {
    /// Send one prompt with the configured per-call timeout, recording spend
    /// against the governor and the transcript store.
    pub async fn call(
        &self,
        run_id: &str,
        round_id: &str,
        model: &ModelRef,
        profiles: &HashMap<ModelRef, ModelProfile>,
        role: ContributionRole,
        prompt: &str,
    ) -> Result<AccountedCall, ProviderError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let request = SendRequest::from_prompt(prompt);

        let completion = match tokio::time::timeout(timeout, self.registry.send(model, request))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout {
                    model: model.to_string(),
                    elapsed_ms: timeout.as_millis() as u64,
                })
            }
        };

        let profile = profiles
            .get(model)
            .ok_or_else(|| ProviderError::ModelNotFound {
                model: model.to_string(),
            })?;
        let (cost, crossed_warn) = self.governor.record(profile, completion.usage);
        if crossed_warn {
            self.events.publish(RunEvent::BudgetWarning {
                run_id: run_id.to_string(),
                spent: self.governor.totals().cost,
                threshold: self.governor.warn_threshold(),
                timestamp: Utc::now(),
            });
        }

        if let Err(e) = self
            .store
            .add_contribution(round_id, model, role, &completion.content, completion.usage, cost)
            .await
        {
            warn!(%model, role = %role, "Failed to persist contribution: {e}");
        }

        Ok(AccountedCall {
            model: model.clone(),
            completion,
            cost,
        })
    }

    /// Propose: send the question (seeded with the previous revision after
    /// round 1) to the proposer and record the proposal.
    pub async fn run_propose(
        &self,
        ctx: &mut RunContext,
        round_id: &str,
        profiles: &HashMap<ModelRef, ModelProfile>,
        previous_revision: Option<String>,
    ) -> Result<(), ConsensusError> {
        let round = ctx.current_round();
        let proposer = match ctx.last_round() {
            Some(r) => r.proposer.clone(),
            None => {
                return Err(ConsensusError::InsufficientModels {
                    needed: 1,
                    available: 0,
                })
            }
        };

        self.events.publish(RunEvent::PhaseStarted {
            run_id: ctx.id.clone(),
            phase: Phase::Propose,
            round,
            models: vec![proposer.clone()],
            timestamp: Utc::now(),
        });

        let prompt = prompts::proposal_prompt(&ctx.question, previous_revision.as_deref());
        let call = self
            .call(
                &ctx.id,
                round_id,
                &proposer,
                profiles,
                ContributionRole::Proposer,
                &prompt,
            )
            .await?;

        ctx.record_usage(call.completion.usage, call.cost);
        if let Some(record) = ctx.current_round_mut() {
            record.proposal = Some(call.completion.content.clone());
        }

        self.events.publish(RunEvent::PhaseCompleted {
            run_id: ctx.id.clone(),
            phase: Phase::Propose,
            round,
            content: Some(call.completion.content),
            timestamp: Utc::now(),
        });
        debug!(round, proposer = %call.model, "Proposal recorded");
        Ok(())
    }

    /// Challenge: fan out to every selected challenger concurrently, classify
    /// each response, and record all entries. Failed or timed-out challengers
    /// are dropped; the phase fails only when successes fall below quorum.
    pub async fn run_challenge(
        &self,
        ctx: &mut RunContext,
        round_id: &str,
        profiles: &HashMap<ModelRef, ModelProfile>,
    ) -> Result<(), ConsensusError> {
        let round = ctx.current_round();
        let (proposal, challengers) = match ctx.last_round() {
            Some(r) => match &r.proposal {
                Some(p) => (p.clone(), r.challengers.clone()),
                None => {
                    return Err(ConsensusError::Transition(
                        TransitionError {
                            from: ctx.phase,
                            to: Phase::Challenge,
                            reason: "no proposal to challenge".to_string(),
                        },
                    ))
                }
            },
            None => {
                return Err(ConsensusError::InsufficientModels {
                    needed: self.config.min_challengers,
                    available: 0,
                })
            }
        };

        self.events.publish(RunEvent::PhaseStarted {
            run_id: ctx.id.clone(),
            phase: Phase::Challenge,
            round,
            models: challengers.clone(),
            timestamp: Utc::now(),
        });

        let prompt = prompts::challenge_prompt(&ctx.question, &proposal);
        let run_id = ctx.id.clone();
        let calls = challengers.iter().map(|challenger| {
            let prompt = prompt.clone();
            let challenger = challenger.clone();
            let run_id = run_id.clone();
            async move {
                let result = self
                    .call(
                        &run_id,
                        round_id,
                        &challenger,
                        profiles,
                        ContributionRole::Challenger,
                        &prompt,
                    )
                    .await;
                (challenger, result)
            }
        });
        let results = join_all(calls).await;

        let mut successes = Vec::new();
        for (challenger, result) in results {
            match result {
                Ok(call) => successes.push(call),
                Err(e) => {
                    warn!(challenger = %challenger, "Challenger dropped from round: {e}");
                }
            }
        }

        if successes.len() < self.config.min_challengers {
            return Err(ConsensusError::InsufficientModels {
                needed: self.config.min_challengers,
                available: successes.len(),
            });
        }

        for call in successes {
            let classification = self
                .classifier
                .classify(&proposal, &call.completion.content);
            self.events.publish(RunEvent::ChallengeRaised {
                run_id: run_id.clone(),
                round,
                model: call.model.clone(),
                content: call.completion.content.clone(),
                genuine: classification.genuine,
                timestamp: Utc::now(),
            });
            ctx.record_usage(call.completion.usage, call.cost);
            if let Some(record) = ctx.current_round_mut() {
                record.challenges.push(ChallengeEntry {
                    challenger: call.model,
                    text: call.completion.content,
                    genuine: classification.genuine,
                    rationale: classification.rationale,
                });
            }
        }

        self.events.publish(RunEvent::PhaseCompleted {
            run_id: ctx.id.clone(),
            phase: Phase::Challenge,
            round,
            content: None,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Revise: send only the genuine challenges back to the proposer. With
    /// zero genuine challenges the proposal is copied forward without a call.
    pub async fn run_revise(
        &self,
        ctx: &mut RunContext,
        round_id: &str,
        profiles: &HashMap<ModelRef, ModelProfile>,
    ) -> Result<(), ConsensusError> {
        let round = ctx.current_round();
        let (proposal, reviser, genuine): (String, ModelRef, Vec<ChallengeEntry>) =
            match ctx.last_round() {
                Some(r) => (
                    r.proposal.clone().unwrap_or_default(),
                    r.reviser.clone(),
                    r.genuine_challenges().cloned().collect(),
                ),
                None => return Ok(()),
            };

        self.events.publish(RunEvent::PhaseStarted {
            run_id: ctx.id.clone(),
            phase: Phase::Revise,
            round,
            models: vec![reviser.clone()],
            timestamp: Utc::now(),
        });

        let revision = if genuine.is_empty() {
            debug!(round, "No genuine challenges; proposal carried forward");
            proposal.clone()
        } else {
            let refs: Vec<&ChallengeEntry> = genuine.iter().collect();
            let prompt = prompts::revision_prompt(&ctx.question, &proposal, &refs);
            let call = self
                .call(
                    &ctx.id,
                    round_id,
                    &reviser,
                    profiles,
                    ContributionRole::Reviser,
                    &prompt,
                )
                .await?;
            ctx.record_usage(call.completion.usage, call.cost);
            call.completion.content
        };

        if let Some(record) = ctx.current_round_mut() {
            record.revision = Some(revision.clone());
        }

        self.events.publish(RunEvent::PhaseCompleted {
            run_id: ctx.id.clone(),
            phase: Phase::Revise,
            round,
            content: Some(revision),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Commit: score the round and pick the surviving dissent. Makes no
    /// provider calls.
    pub async fn run_commit(
        &self,
        ctx: &mut RunContext,
        round_id: &str,
    ) -> Result<(), ConsensusError> {
        let round = ctx.current_round();

        let (confidence, dissent) = match ctx.last_round() {
            Some(record) => {
                let revision = record.revision.as_deref().unwrap_or_default();
                let total = record.challenges.len();
                let genuine: Vec<_> = record.genuine_challenges().collect();

                // Unresolved genuine challenges, weakest coverage first.
                let mut unresolved: Vec<(f64, &str)> = genuine
                    .iter()
                    .map(|c| (challenge_coverage(&c.text, revision), c.text.as_str()))
                    .filter(|(coverage, _)| *coverage < RESOLUTION_COVERAGE)
                    .collect();
                unresolved.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let confidence =
                    self.policy
                        .score(genuine.len(), total, !unresolved.is_empty());
                let dissent = unresolved.first().map(|(_, text)| text.to_string());
                (confidence, dissent)
            }
            None => (0.0, None),
        };

        if let Some(record) = ctx.current_round_mut() {
            record.confidence = confidence;
            record.dissent = dissent.clone();
        }

        if let Some(record) = ctx.last_round() {
            if let Some(revision) = &record.revision {
                if let Err(e) = self
                    .store
                    .save_decision(round_id, revision, confidence, dissent.as_deref())
                    .await
                {
                    warn!(round, "Failed to persist round decision: {e}");
                }
            }
        }

        self.events.publish(RunEvent::RoundCommitted {
            run_id: ctx.id.clone(),
            round,
            confidence,
            dissent,
            timestamp: Utc::now(),
        });
        info!(round, confidence, "Round committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_all_sycophantic_is_full() {
        let policy = ConfidencePolicy::default();
        assert!((policy.score(0, 3, false) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_all_genuine_unresolved_is_low() {
        let policy = ConfidencePolicy::default();
        // 1 - 0.6 - 0.2 = 0.2
        assert!((policy.score(3, 3, true) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let policy = ConfidencePolicy {
            genuine_weight: 0.9,
            unresolved_penalty: 0.5,
        };
        for genuine in 0..=4 {
            for unresolved in [false, true] {
                let score = policy.score(genuine, 4, unresolved);
                assert!((0.0..=1.0).contains(&score), "score {score} out of range");
            }
        }
    }

    #[test]
    fn test_confidence_zero_challenges_is_zero() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.score(0, 0, false), 0.0);
    }

    #[test]
    fn test_coverage_full_when_revision_quotes_challenge() {
        let challenge = "the algorithm ignores negative inputs entirely";
        let revision = "addressed: the algorithm no longer ignores negative inputs; \
                        entirely new guard added";
        assert!((challenge_coverage(challenge, revision) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_coverage_zero_when_revision_unrelated() {
        let challenge = "missing citation for thermodynamics claim";
        let revision = "short words only here";
        assert_eq!(challenge_coverage(challenge, revision), 0.0);
    }

    #[test]
    fn test_coverage_ignores_short_words() {
        // Challenge made of short words has nothing substantive to cover.
        assert!((challenge_coverage("is it ok no", "anything") - 1.0).abs() < f64::EPSILON);
    }
}
