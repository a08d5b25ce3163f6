//! Engine configuration loaded from TOML, with validated defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Challenger selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengerStrategy {
    /// Rotate the starting offset by round number so repeated rounds draw
    /// from different pool members.
    #[default]
    RoundRobin,
}

/// How the voting judge aggregates respondent answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Judge names one respondent's answer as final.
    #[default]
    Majority,
    /// Judge synthesizes a merged answer, weighting by capability proxy.
    Weighted,
}

impl std::fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Majority => write!(f, "majority"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

/// Debate protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    /// Maximum propose/challenge/revise/commit cycles (1-10).
    pub max_rounds: u32,
    /// Quorum of successful challengers per round.
    pub min_challengers: usize,
    /// Challenger rotation strategy.
    pub challenger_strategy: ChallengerStrategy,
    /// Jaccard similarity at or above which the debate stops early.
    pub convergence_threshold: f64,
    /// Per-call timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            min_challengers: 1,
            challenger_strategy: ChallengerStrategy::RoundRobin,
            convergence_threshold: 0.70,
            request_timeout_secs: 120,
        }
    }
}

/// Budget settings, dollars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSection {
    /// Emit a one-time warning when run spend crosses this amount.
    pub warn_threshold: f64,
    /// Abort the run when spend exceeds this amount. 0 disables the limit.
    pub hard_limit: f64,
}

impl Default for CostSection {
    fn default() -> Self {
        Self {
            warn_threshold: 1.0,
            hard_limit: 0.0,
        }
    }
}

/// Question decomposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeSection {
    /// Upper bound on subtask count (2-7).
    pub max_subtasks: usize,
    /// Run ready subtasks concurrently instead of sequentially.
    pub parallel: bool,
}

impl Default for DecomposeSection {
    fn default() -> Self {
        Self {
            max_subtasks: 5,
            parallel: true,
        }
    }
}

/// Voting protocol settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingSection {
    pub aggregation: AggregationMode,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub consensus: ConsensusSection,
    pub cost: CostSection,
    pub decompose: DecomposeSection,
    pub voting: VotingSection,
}

impl ConclaveConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every recognized option against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if !(1..=10).contains(&self.consensus.max_rounds) {
            problems.push(format!(
                "consensus.max_rounds must be 1-10, got {}",
                self.consensus.max_rounds
            ));
        }
        if self.consensus.min_challengers == 0 {
            problems.push("consensus.min_challengers must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.consensus.convergence_threshold) {
            problems.push(format!(
                "consensus.convergence_threshold must be in [0,1], got {}",
                self.consensus.convergence_threshold
            ));
        }
        if self.consensus.request_timeout_secs == 0 {
            problems.push("consensus.request_timeout_secs must be nonzero".to_string());
        }
        if self.cost.warn_threshold < 0.0 {
            problems.push("cost.warn_threshold must be non-negative".to_string());
        }
        if self.cost.hard_limit < 0.0 {
            problems.push("cost.hard_limit must be non-negative (0 disables)".to_string());
        }
        if self.cost.hard_limit > 0.0 && self.cost.warn_threshold > self.cost.hard_limit {
            problems.push("cost.warn_threshold exceeds cost.hard_limit".to_string());
        }
        if !(2..=7).contains(&self.decompose.max_subtasks) {
            problems.push(format!(
                "decompose.max_subtasks must be 2-7, got {}",
                self.decompose.max_subtasks
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = ConclaveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.consensus.max_rounds, 3);
        assert!((config.consensus.convergence_threshold - 0.70).abs() < f64::EPSILON);
        assert_eq!(config.cost.hard_limit, 0.0);
    }

    #[test]
    fn test_max_rounds_out_of_range() {
        let mut config = ConclaveConfig::default();
        config.consensus.max_rounds = 11;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn test_subtask_bounds() {
        let mut config = ConclaveConfig::default();
        config.decompose.max_subtasks = 1;
        assert!(config.validate().is_err());
        config.decompose.max_subtasks = 8;
        assert!(config.validate().is_err());
        config.decompose.max_subtasks = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_warn_above_hard_limit_rejected() {
        let mut config = ConclaveConfig::default();
        config.cost.warn_threshold = 5.0;
        config.cost.hard_limit = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[consensus]
max_rounds = 5
min_challengers = 2
convergence_threshold = 0.8

[cost]
warn_threshold = 0.5
hard_limit = 2.0

[decompose]
max_subtasks = 4
parallel = false

[voting]
aggregation = "weighted"
"#
        )
        .unwrap();

        let config = ConclaveConfig::load(file.path()).unwrap();
        assert_eq!(config.consensus.max_rounds, 5);
        assert_eq!(config.consensus.min_challengers, 2);
        assert!(!config.decompose.parallel);
        assert_eq!(config.voting.aggregation, AggregationMode::Weighted);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cost]\nwarn_threshold = 0.25").unwrap();

        let config = ConclaveConfig::load(file.path()).unwrap();
        assert_eq!(config.consensus.max_rounds, 3);
        assert!((config.cost.warn_threshold - 0.25).abs() < f64::EPSILON);
    }
}
