//! Convergence detection over successive rounds' challenge text.
//!
//! Uses token-level Jaccard similarity on case-insensitive word sets. When
//! challengers start repeating themselves the debate has stabilized and
//! further rounds only spend budget.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default similarity at or above which the debate stops early.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.70;

/// Outcome of one convergence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceCheck {
    /// Jaccard similarity in [0,1].
    pub similarity: f64,
    /// Whether similarity reached the threshold.
    pub converged: bool,
    /// Threshold used for the check.
    pub threshold: f64,
}

/// Token-level Jaccard similarity between two texts: |A∩B| / |A∪B| over
/// lowercase word sets. Both empty is defined as 1.0 (identical silence);
/// one empty is 0.0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Compares consecutive rounds' concatenated challenge text.
#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    threshold: f64,
}

impl ConvergenceDetector {
    /// Create a detector with the given threshold, clamped to [0,1].
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Check the current round's challenge text against the previous
    /// round's. `previous` is None on round 1, which is never convergent.
    pub fn check(&self, previous: Option<&str>, current: &str) -> ConvergenceCheck {
        match previous {
            None => ConvergenceCheck {
                similarity: 0.0,
                converged: false,
                threshold: self.threshold,
            },
            Some(prev) => {
                let similarity = jaccard_similarity(prev, current);
                ConvergenceCheck {
                    similarity,
                    converged: similarity >= self.threshold,
                    threshold: self.threshold,
                }
            }
        }
    }
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERGENCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_score_one() {
        let sim = jaccard_similarity("the answer is wrong", "the answer is wrong");
        assert!((sim - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_case_insensitive() {
        let sim = jaccard_similarity("The Answer Is Wrong", "the answer is wrong");
        assert!((sim - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        let sim = jaccard_similarity("alpha beta gamma", "delta epsilon zeta");
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {a, b, c} vs {b, c, d}: intersection 2, union 4.
        let sim = jaccard_similarity("a b c", "b c d");
        assert!((sim - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_both_empty_is_converged() {
        assert!((jaccard_similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_one_empty_is_zero() {
        assert_eq!(jaccard_similarity("", "something"), 0.0);
        assert_eq!(jaccard_similarity("something", ""), 0.0);
    }

    #[test]
    fn test_similarity_always_in_unit_interval() {
        let pairs = [
            ("a b c d e", "a"),
            ("x", "x y z"),
            ("repeated repeated repeated", "repeated"),
        ];
        for (a, b) in pairs {
            let sim = jaccard_similarity(a, b);
            assert!((0.0..=1.0).contains(&sim), "similarity {sim} out of range");
        }
    }

    #[test]
    fn test_first_round_never_convergent() {
        let detector = ConvergenceDetector::default();
        let check = detector.check(None, "any challenge text at all");
        assert!(!check.converged);
        assert_eq!(check.similarity, 0.0);
    }

    #[test]
    fn test_identical_rounds_converge() {
        let detector = ConvergenceDetector::default();
        let text = "the proof skips the inductive step";
        let check = detector.check(Some(text), text);
        assert!(check.converged);
        assert!((check.similarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_below_threshold_not_converged() {
        let detector = ConvergenceDetector::new(0.70);
        let check = detector.check(Some("a b c d"), "a x y z");
        assert!(!check.converged);
        assert!(check.similarity < 0.70);
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(ConvergenceDetector::new(1.5).threshold(), 1.0);
        assert_eq!(ConvergenceDetector::new(-0.2).threshold(), 0.0);
    }
}
