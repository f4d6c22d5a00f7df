//! Monitor configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration rejected before the monitor starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one simulated user is required")]
    NoUsers,

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("completion mode 'all-on-target' needs a target version")]
    NoTarget,

    #[error("invalid value '{value}' for {field}")]
    Invalid { field: &'static str, value: String },
}

/// When the rollout counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionMode {
    /// Every user is served something other than the baseline version.
    #[default]
    AllUpdated,
    /// Every user is served the target version.
    AllOnTarget,
}

impl FromStr for CompletionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-updated" => Ok(Self::AllUpdated),
            "all-on-target" => Ok(Self::AllOnTarget),
            _ => Err(ConfigError::Invalid {
                field: "completion",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUpdated => write!(f, "all-updated"),
            Self::AllOnTarget => write!(f, "all-on-target"),
        }
    }
}

/// How the users of one round are polled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollMode {
    /// One user after another.
    #[default]
    Sequential,
    /// All users at once, joined before the store is updated.
    Concurrent,
}

impl FromStr for PollMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            _ => Err(ConfigError::Invalid {
                field: "poll_mode",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Termination predicate applied to every user after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Satisfied when the user's version differs from the baseline.
    OffBaseline(String),
    /// Satisfied when the user's version equals the target.
    OnTarget(String),
}

impl Completion {
    /// Check a single observed version.
    pub fn is_satisfied_by(&self, version: &str) -> bool {
        match self {
            Self::OffBaseline(baseline) => version != baseline,
            Self::OnTarget(target) => version == target,
        }
    }
}

/// Settings for one monitor run. `users` is fixed for the run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Number of simulated users.
    pub users: usize,
    /// Version served before the rollout began.
    pub baseline_version: String,
    /// Version being rolled out, if known.
    pub target_version: Option<String>,
    /// Termination rule.
    pub completion: CompletionMode,
    /// Delay between the end of one round and the start of the next.
    pub poll_interval: Duration,
    /// Give up at the first round boundary after this much time.
    pub timeout: Option<Duration>,
    /// Round polling strategy.
    pub poll_mode: PollMode,
}

impl MonitorConfig {
    /// Default delay between rounds.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a config with defaults for everything but the population
    /// and baseline.
    pub fn new(users: usize, baseline_version: impl Into<String>) -> Self {
        Self {
            users,
            baseline_version: baseline_version.into(),
            target_version: None,
            completion: CompletionMode::default(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            timeout: None,
            poll_mode: PollMode::default(),
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    ///
    /// Zero users would make the completion check vacuously true, so it
    /// is refused here instead of reported as an instant success.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }
        if self.baseline_version.trim().is_empty() {
            return Err(ConfigError::Missing("baseline_version"));
        }
        if self.completion == CompletionMode::AllOnTarget
            && self.target_version.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(ConfigError::NoTarget);
        }
        Ok(())
    }

    /// The termination predicate for this run.
    pub fn completion(&self) -> Completion {
        match (self.completion, &self.target_version) {
            (CompletionMode::AllOnTarget, Some(target)) => Completion::OnTarget(target.clone()),
            _ => Completion::OffBaseline(self.baseline_version.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_users_rejected() {
        let config = MonitorConfig::new(0, "1.0.0");
        assert_eq!(config.validate(), Err(ConfigError::NoUsers));
    }

    #[test]
    fn test_blank_baseline_rejected() {
        let config = MonitorConfig::new(3, "  ");
        assert_eq!(config.validate(), Err(ConfigError::Missing("baseline_version")));
    }

    #[test]
    fn test_target_mode_needs_target() {
        let mut config = MonitorConfig::new(3, "1.0.0");
        config.completion = CompletionMode::AllOnTarget;
        assert_eq!(config.validate(), Err(ConfigError::NoTarget));

        config.target_version = Some("2.0.0".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.completion(), Completion::OnTarget("2.0.0".to_string()));
    }

    #[test]
    fn test_completion_predicates() {
        let off = Completion::OffBaseline("1.0.0".to_string());
        assert!(!off.is_satisfied_by("1.0.0"));
        assert!(off.is_satisfied_by("2.0.0"));

        let on = Completion::OnTarget("2.0.0".to_string());
        assert!(on.is_satisfied_by("2.0.0"));
        assert!(!on.is_satisfied_by("1.5.0"));
    }

    #[test]
    fn test_modes_parse_from_kebab_case() {
        assert_eq!("all-on-target".parse(), Ok(CompletionMode::AllOnTarget));
        assert_eq!("concurrent".parse(), Ok(PollMode::Concurrent));
        assert!("parallel".parse::<PollMode>().is_err());
    }
}
