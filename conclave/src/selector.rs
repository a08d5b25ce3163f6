//! Model selection: proposer by capability proxy, challengers by rotation.

use tracing::debug;

use crate::config::ChallengerStrategy;
use crate::error::ConsensusError;
use crate::registry::{ModelProfile, ModelRef};

/// Selection policy over the registry's current model pool. The pool is
/// passed in per call so health filtering stays with the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector;

impl ModelSelector {
    /// Pick the proposer: highest output-cost-per-million among
    /// proposer-eligible models. Cost is the capability proxy, a more
    /// expensive model is presumed stronger. Registration order breaks ties
    /// (first wins).
    pub fn select_proposer(&self, pool: &[ModelProfile]) -> Result<ModelRef, ConsensusError> {
        let mut best: Option<&ModelProfile> = None;
        for profile in pool.iter().filter(|p| p.proposer_eligible) {
            match best {
                None => best = Some(profile),
                Some(current) => {
                    if profile.output_cost_per_million > current.output_cost_per_million {
                        best = Some(profile);
                    }
                }
            }
        }

        match best {
            Some(profile) => {
                debug!(model = %profile.model, "Proposer selected");
                Ok(profile.model.clone())
            }
            None => Err(ConsensusError::InsufficientModels {
                needed: 1,
                available: 0,
            }),
        }
    }

    /// Pick the meta-judge: highest output-cost-per-million over the whole
    /// pool. Proposer eligibility does not apply; judging only needs the
    /// strongest available model.
    pub fn select_judge(&self, pool: &[ModelProfile]) -> Result<ModelRef, ConsensusError> {
        let mut best: Option<&ModelProfile> = None;
        for profile in pool {
            match best {
                None => best = Some(profile),
                Some(current) => {
                    if profile.output_cost_per_million > current.output_cost_per_million {
                        best = Some(profile);
                    }
                }
            }
        }

        match best {
            Some(profile) => {
                debug!(model = %profile.model, "Judge selected");
                Ok(profile.model.clone())
            }
            None => Err(ConsensusError::InsufficientModels {
                needed: 1,
                available: 0,
            }),
        }
    }

    /// Pick at least `min_count` distinct challengers, excluding the
    /// proposer. Round-robin rotates the starting offset by round number so
    /// repeated rounds draw different pool members when more models exist
    /// than are needed.
    pub fn select_challengers(
        &self,
        pool: &[ModelProfile],
        excluding: &ModelRef,
        strategy: ChallengerStrategy,
        min_count: usize,
        round: u32,
    ) -> Result<Vec<ModelRef>, ConsensusError> {
        let eligible: Vec<&ModelProfile> =
            pool.iter().filter(|p| &p.model != excluding).collect();

        if eligible.len() < min_count {
            return Err(ConsensusError::InsufficientModels {
                needed: min_count,
                available: eligible.len(),
            });
        }

        let selected: Vec<ModelRef> = match strategy {
            ChallengerStrategy::RoundRobin => {
                let offset = (round.saturating_sub(1) as usize) % eligible.len();
                eligible
                    .iter()
                    .cycle()
                    .skip(offset)
                    .take(min_count)
                    .map(|p| p.model.clone())
                    .collect()
            }
        };

        debug!(round, count = selected.len(), "Challengers selected");
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(model: &str, output_rate: f64, eligible: bool) -> ModelProfile {
        ModelProfile {
            model: ModelRef::new(model),
            display_name: model.to_string(),
            context_window: 128_000,
            input_cost_per_million: output_rate / 5.0,
            output_cost_per_million: output_rate,
            proposer_eligible: eligible,
        }
    }

    fn pool() -> Vec<ModelProfile> {
        vec![
            profile("cheap", 1.0, true),
            profile("mid", 10.0, true),
            profile("premium", 75.0, true),
            profile("critic-only", 120.0, false),
        ]
    }

    #[test]
    fn test_proposer_is_most_expensive_eligible() {
        let selector = ModelSelector;
        let proposer = selector.select_proposer(&pool()).unwrap();
        // critic-only is pricier but not proposer-eligible.
        assert_eq!(proposer.as_str(), "premium");
    }

    #[test]
    fn test_proposer_tie_broken_by_registration_order() {
        let selector = ModelSelector;
        let pool = vec![
            profile("first", 50.0, true),
            profile("second", 50.0, true),
        ];
        let proposer = selector.select_proposer(&pool).unwrap();
        assert_eq!(proposer.as_str(), "first");
    }

    #[test]
    fn test_empty_pool_fails() {
        let selector = ModelSelector;
        let err = selector.select_proposer(&[]).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::InsufficientModels { needed: 1, available: 0 }
        ));
    }

    #[test]
    fn test_no_eligible_proposer_fails() {
        let selector = ModelSelector;
        let pool = vec![profile("critic", 100.0, false)];
        assert!(selector.select_proposer(&pool).is_err());
    }

    #[test]
    fn test_judge_ignores_proposer_eligibility() {
        let selector = ModelSelector;
        // critic-only is the priciest model but not proposer-eligible.
        let judge = selector.select_judge(&pool()).unwrap();
        assert_eq!(judge.as_str(), "critic-only");
    }

    #[test]
    fn test_judge_from_empty_pool_fails() {
        let selector = ModelSelector;
        assert!(selector.select_judge(&[]).is_err());
    }

    #[test]
    fn test_challengers_exclude_proposer() {
        let selector = ModelSelector;
        let proposer = ModelRef::new("premium");
        let challengers = selector
            .select_challengers(&pool(), &proposer, ChallengerStrategy::RoundRobin, 3, 1)
            .unwrap();
        assert_eq!(challengers.len(), 3);
        assert!(!challengers.contains(&proposer));
    }

    #[test]
    fn test_round_robin_rotates_by_round() {
        let selector = ModelSelector;
        let proposer = ModelRef::new("premium");
        let round1 = selector
            .select_challengers(&pool(), &proposer, ChallengerStrategy::RoundRobin, 2, 1)
            .unwrap();
        let round2 = selector
            .select_challengers(&pool(), &proposer, ChallengerStrategy::RoundRobin, 2, 2)
            .unwrap();

        // Eligible order: cheap, mid, critic-only.
        assert_eq!(round1[0].as_str(), "cheap");
        assert_eq!(round2[0].as_str(), "mid");
    }

    #[test]
    fn test_rotation_wraps_past_pool_end() {
        let selector = ModelSelector;
        let proposer = ModelRef::new("premium");
        // Offset (4-1) % 3 = 0, back to the start.
        let round4 = selector
            .select_challengers(&pool(), &proposer, ChallengerStrategy::RoundRobin, 2, 4)
            .unwrap();
        assert_eq!(round4[0].as_str(), "cheap");
    }

    #[test]
    fn test_quorum_shortfall_fails() {
        let selector = ModelSelector;
        let proposer = ModelRef::new("premium");
        let err = selector
            .select_challengers(&pool(), &proposer, ChallengerStrategy::RoundRobin, 4, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::InsufficientModels { needed: 4, available: 3 }
        ));
    }
}
