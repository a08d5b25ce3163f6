//! Genuineness classification for challenge responses.
//!
//! A challenger told to disagree will sometimes just agree politely. The
//! classifier labels each response genuine or sycophantic so revise and
//! commit only weigh actual disagreement. Heuristic today, replaceable with
//! a model-based classifier behind the same trait.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::convergence::jaccard_similarity;

/// Label plus rationale for one challenge response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub genuine: bool,
    pub rationale: String,
}

/// Pluggable classifier interface.
pub trait ChallengeClassifier: Send + Sync {
    /// Classify a challenge response against the proposal it attacks.
    fn classify(&self, proposal: &str, challenge: &str) -> Classification;
}

/// Word-overlap above which a challenge is considered a restatement of the
/// proposal rather than an attack on it.
const OVERLAP_CEILING: f64 = 0.6;

/// Textual heuristic: disagreement lexical markers plus low overlap with
/// the proposal mark a challenge as genuine.
pub struct LexicalClassifier {
    disagreement: Regex,
    agreement: Regex,
}

impl LexicalClassifier {
    pub fn new() -> Self {
        // Static patterns, compile-checked by tests.
        Self {
            disagreement: Regex::new(
                r"(?i)\b(disagree|incorrect|wrong|flaw|mistake|error|however|but|fails?|overlooks?|ignores?|misses|misleading|unsupported|contradicts?|weak|problematic|questionable)\b",
            )
            .unwrap(),
            agreement: Regex::new(
                r"(?i)\b(i agree|well said|excellent point|correct|exactly right|no objections?|nothing to add|sound reasoning|well argued)\b",
            )
            .unwrap(),
        }
    }
}

impl Default for LexicalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeClassifier for LexicalClassifier {
    fn classify(&self, proposal: &str, challenge: &str) -> Classification {
        if challenge.trim().is_empty() {
            return Classification {
                genuine: false,
                rationale: "empty response".to_string(),
            };
        }

        let agrees = self.agreement.is_match(challenge);
        let disagrees = self.disagreement.is_match(challenge);
        let overlap = jaccard_similarity(proposal, challenge);

        if agrees && !disagrees {
            return Classification {
                genuine: false,
                rationale: "agreement markers without any disagreement markers".to_string(),
            };
        }

        if overlap > OVERLAP_CEILING {
            return Classification {
                genuine: false,
                rationale: format!(
                    "challenge restates the proposal (word overlap {overlap:.2} > {OVERLAP_CEILING})"
                ),
            };
        }

        if disagrees {
            Classification {
                genuine: true,
                rationale: format!(
                    "disagreement markers present, word overlap {overlap:.2}"
                ),
            }
        } else {
            Classification {
                genuine: false,
                rationale: "no disagreement markers found".to_string(),
            }
        }
    }
}
