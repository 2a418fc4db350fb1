//! Experiments: A/B tests over creative variants of a completed job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ExperimentId, JobId, OrgId};

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentState {
    Draft,
    Running,
    Promoted,
    Stopped,
}

impl ExperimentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentState::Draft => "DRAFT",
            ExperimentState::Running => "RUNNING",
            ExperimentState::Promoted => "PROMOTED",
            ExperimentState::Stopped => "STOPPED",
        }
    }

    /// Promoted and stopped experiments never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentState::Promoted | ExperimentState::Stopped)
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversion metric an experiment optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TargetMetric {
    /// Click-through rate
    #[serde(rename = "CTR")]
    Ctr,
    /// Viewers retained past 3 seconds
    Watch3s,
    /// Viewers retained past 30 seconds
    Watch30s,
}

impl TargetMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMetric::Ctr => "CTR",
            TargetMetric::Watch3s => "Watch3s",
            TargetMetric::Watch30s => "Watch30s",
        }
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Distribution platform the variants are published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Shorts,
    Reels,
    X,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Shorts => "shorts",
            Platform::Reels => "reels",
            Platform::X => "x",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const DEFAULT_MIN_IMPRESSIONS: u64 = 500;
pub const DEFAULT_MIN_RUNTIME_SECONDS: i64 = 3600;
pub const DEFAULT_PRIOR_ALPHA: f64 = 1.0;
pub const DEFAULT_PRIOR_BETA: f64 = 1.0;

/// An A/B test bound to a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Experiment {
    /// Unique experiment ID
    pub id: ExperimentId,
    /// Job whose output the variants were cut from
    pub job_id: JobId,
    /// Owning organization
    pub org_id: OrgId,
    /// Display name
    pub name: String,
    /// Distribution platform
    pub platform: Platform,
    /// Metric the bandit optimizes for
    pub target_metric: TargetMetric,
    /// Minimum total impressions before promotion is considered
    pub min_impressions: u64,
    /// Minimum wall-clock runtime before promotion is considered
    pub min_runtime_seconds: i64,
    /// Beta-prior alpha hyperparameter
    pub prior_alpha: f64,
    /// Beta-prior beta hyperparameter
    pub prior_beta: f64,
    /// Lifecycle state
    pub state: ExperimentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Create a running experiment with default thresholds and priors.
    pub fn new(
        job_id: JobId,
        org_id: OrgId,
        name: impl Into<String>,
        platform: Platform,
        target_metric: TargetMetric,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExperimentId::new(),
            job_id,
            org_id,
            name: name.into(),
            platform,
            target_metric,
            min_impressions: DEFAULT_MIN_IMPRESSIONS,
            min_runtime_seconds: DEFAULT_MIN_RUNTIME_SECONDS,
            prior_alpha: DEFAULT_PRIOR_ALPHA,
            prior_beta: DEFAULT_PRIOR_BETA,
            state: ExperimentState::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the impression threshold.
    pub fn with_min_impressions(mut self, min_impressions: u64) -> Self {
        self.min_impressions = min_impressions;
        self
    }

    /// Set the runtime threshold.
    pub fn with_min_runtime_seconds(mut self, min_runtime_seconds: i64) -> Self {
        self.min_runtime_seconds = min_runtime_seconds;
        self
    }

    /// Set the Beta-prior hyperparameters.
    pub fn with_priors(mut self, prior_alpha: f64, prior_beta: f64) -> Self {
        self.prior_alpha = prior_alpha;
        self.prior_beta = prior_beta;
        self
    }

    /// Whether the experiment has run long enough, as of `now`, for
    /// promotion to be considered.
    pub fn runtime_satisfied_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= self.min_runtime_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn experiment() -> Experiment {
        Experiment::new(
            JobId::from_string("job-1"),
            OrgId::from_string("org-1"),
            "hook test",
            Platform::Tiktok,
            TargetMetric::Ctr,
        )
    }

    #[test]
    fn new_experiment_runs_with_defaults() {
        let exp = experiment();
        assert_eq!(exp.state, ExperimentState::Running);
        assert_eq!(exp.min_impressions, 500);
        assert_eq!(exp.min_runtime_seconds, 3600);
        assert!((exp.prior_alpha - 1.0).abs() < f64::EPSILON);
        assert!((exp.prior_beta - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn runtime_gate_uses_wall_clock_since_creation() {
        let exp = experiment().with_min_runtime_seconds(3600);
        let now = exp.created_at;
        assert!(!exp.runtime_satisfied_at(now));
        assert!(!exp.runtime_satisfied_at(now + Duration::seconds(3599)));
        assert!(exp.runtime_satisfied_at(now + Duration::seconds(3600)));
    }

    #[test]
    fn zero_runtime_threshold_is_immediately_satisfied() {
        let exp = experiment().with_min_runtime_seconds(0);
        assert!(exp.runtime_satisfied_at(exp.created_at));
    }

    #[test]
    fn target_metric_wire_names_match_api() {
        assert_eq!(
            serde_json::to_string(&TargetMetric::Ctr).expect("serialize"),
            "\"CTR\""
        );
        assert_eq!(
            serde_json::to_string(&TargetMetric::Watch30s).expect("serialize"),
            "\"Watch30s\""
        );
    }
}
