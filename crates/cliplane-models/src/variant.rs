//! Creative variants and their observed statistics.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ExperimentId, TargetMetric, VariantId};

/// Lifecycle state of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantState {
    Ready,
    Paused,
    Killed,
    Promoted,
}

impl VariantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantState::Ready => "READY",
            VariantState::Paused => "PAUSED",
            VariantState::Killed => "KILLED",
            VariantState::Promoted => "PROMOTED",
        }
    }
}

impl fmt::Display for VariantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One creative arm of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Variant {
    /// Unique variant ID
    pub id: VariantId,
    /// Owning experiment
    pub experiment_id: ExperimentId,
    /// Position within the experiment, 0-based, assigned at creation
    pub index: u32,
    /// Lifecycle state
    pub state: VariantState,
    /// Opening hook copy
    pub hook_text: String,
    /// Caption copy
    pub caption_text: String,
    /// Optional render style preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// Create a ready variant at the given index.
    pub fn new(
        experiment_id: ExperimentId,
        index: u32,
        hook_text: impl Into<String>,
        caption_text: impl Into<String>,
        style_preset: Option<String>,
    ) -> Self {
        Self {
            id: VariantId::new(),
            experiment_id,
            index,
            state: VariantState::Ready,
            hook_text: hook_text.into(),
            caption_text: caption_text.into(),
            style_preset,
            created_at: Utc::now(),
        }
    }
}

/// Non-negative counter deltas for one metrics batch item.
///
/// Unsigned fields make the "deltas must be non-negative" rule a type
/// guarantee rather than a runtime check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsDelta {
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub watch3s: u64,
    #[serde(default)]
    pub watch30s: u64,
}

impl MetricsDelta {
    /// The delta of the success counter for a metric.
    pub fn successes_for(&self, metric: TargetMetric) -> u64 {
        match metric {
            TargetMetric::Ctr => self.clicks,
            TargetMetric::Watch3s => self.watch3s,
            TargetMetric::Watch30s => self.watch30s,
        }
    }
}

/// Accumulated counters and the current Beta posterior for one variant.
///
/// Counters only ever grow. `alpha`/`beta` are derived: after every applied
/// delta, `alpha = prior_alpha + successes` and
/// `beta = prior_beta + max(impressions - successes, 0)` where `successes`
/// is the counter matching the experiment's target metric.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VariantStat {
    /// Variant the stats belong to (one-to-one)
    pub variant_id: VariantId,
    pub impressions: u64,
    pub clicks: u64,
    pub watch3s: u64,
    pub watch30s: u64,
    /// Current posterior alpha
    pub alpha: f64,
    /// Current posterior beta
    pub beta: f64,
    /// When metrics were last applied
    pub last_ingested_at: DateTime<Utc>,
}

impl VariantStat {
    /// Zeroed counters with the posterior at the priors.
    pub fn zeroed(variant_id: VariantId, prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            variant_id,
            impressions: 0,
            clicks: 0,
            watch3s: 0,
            watch30s: 0,
            alpha: prior_alpha,
            beta: prior_beta,
            last_ingested_at: Utc::now(),
        }
    }

    /// The accumulated success counter for a metric.
    pub fn successes(&self, metric: TargetMetric) -> u64 {
        match metric {
            TargetMetric::Ctr => self.clicks,
            TargetMetric::Watch3s => self.watch3s,
            TargetMetric::Watch30s => self.watch30s,
        }
    }

    /// Accumulate a delta and recompute the posterior.
    ///
    /// The failures term saturates at zero, guarding against inconsistent
    /// batches where a successes delta exceeds the impressions delta.
    pub fn apply_delta(
        &mut self,
        delta: &MetricsDelta,
        metric: TargetMetric,
        prior_alpha: f64,
        prior_beta: f64,
    ) {
        self.impressions += delta.impressions;
        self.clicks += delta.clicks;
        self.watch3s += delta.watch3s;
        self.watch30s += delta.watch30s;

        let successes = self.successes(metric);
        let failures = self.impressions.saturating_sub(successes);
        self.alpha = prior_alpha + successes as f64;
        self.beta = prior_beta + failures as f64;
        self.last_ingested_at = Utc::now();
    }
}
