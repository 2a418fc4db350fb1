//! The experiment engine: variant creation, metrics ingestion and the
//! promote-or-keep-exploring decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use cliplane_models::{
    Experiment, ExperimentId, ExperimentState, JobId, MetricsDelta, Platform, TargetMetric,
    Variant, VariantId, VariantState, VariantStat, DEFAULT_MIN_IMPRESSIONS,
    DEFAULT_MIN_RUNTIME_SECONDS,
};
use cliplane_store::{ExperimentStore, JobStore};

use crate::error::{ExperimentError, ExperimentResult};
use crate::posterior::{
    recommend_allocations, should_promote, Promotion, VariantPosterior, DEFAULT_MIN_SHARE,
};

/// One creative arm in a creation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateVariant {
    pub hook_text: String,
    pub caption_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<String>,
}

fn default_min_impressions() -> u64 {
    DEFAULT_MIN_IMPRESSIONS
}

fn default_min_runtime_seconds() -> i64 {
    DEFAULT_MIN_RUNTIME_SECONDS
}

/// Experiment creation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CreateExperiment {
    /// Completed job the variants were cut from
    pub job_id: JobId,
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    pub platform: Platform,
    pub target_metric: TargetMetric,
    #[serde(default = "default_min_impressions")]
    pub min_impressions: u64,
    #[serde(default = "default_min_runtime_seconds")]
    pub min_runtime_seconds: i64,
    /// An experiment needs something to compare.
    #[validate(length(min = 2, message = "at least two variants are required"))]
    pub variants: Vec<CreateVariant>,
}

/// A variant with its current statistics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VariantDetails {
    pub variant: Variant,
    pub stat: VariantStat,
}

/// An experiment with all of its variants.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExperimentDetails {
    pub experiment: Experiment,
    pub variants: Vec<VariantDetails>,
}

/// One item of a metrics batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MetricsItem {
    pub variant_id: VariantId,
    #[serde(flatten)]
    pub delta: MetricsDelta,
}

/// Outcome of a metrics batch: items for unknown variants are skipped, not
/// fatal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct IngestSummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Outcome of a `decide` call. Allocations are always present so traffic
/// splitting can continue whether or not a winner was crowned.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub experiment_id: ExperimentId,
    pub state: ExperimentState,
    pub allocations: BTreeMap<VariantId, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<Promotion>,
}

/// Bayesian bandit engine over an external experiment store.
pub struct ExperimentEngine {
    experiments: Arc<dyn ExperimentStore>,
    jobs: Arc<dyn JobStore>,
}

impl ExperimentEngine {
    pub fn new(experiments: Arc<dyn ExperimentStore>, jobs: Arc<dyn JobStore>) -> Self {
        Self { experiments, jobs }
    }

    /// Create a running experiment with READY variants and stats at the
    /// priors.
    pub async fn create_experiment(
        &self,
        request: CreateExperiment,
    ) -> ExperimentResult<ExperimentDetails> {
        request
            .validate()
            .map_err(|e| ExperimentError::invalid(e.to_string()))?;

        let job = self
            .jobs
            .get_job(&request.job_id)
            .await?
            .ok_or_else(|| ExperimentError::JobNotFound(request.job_id.clone()))?;

        let experiment = Experiment::new(
            job.id.clone(),
            job.org_id.clone(),
            request.name,
            request.platform,
            request.target_metric,
        )
        .with_min_impressions(request.min_impressions)
        .with_min_runtime_seconds(request.min_runtime_seconds);

        let variants: Vec<Variant> = request
            .variants
            .into_iter()
            .enumerate()
            .map(|(index, v)| {
                Variant::new(
                    experiment.id.clone(),
                    index as u32,
                    v.hook_text,
                    v.caption_text,
                    v.style_preset,
                )
            })
            .collect();
        let stats: Vec<VariantStat> = variants
            .iter()
            .map(|v| {
                VariantStat::zeroed(v.id.clone(), experiment.prior_alpha, experiment.prior_beta)
            })
            .collect();

        self.experiments
            .create_experiment(experiment.clone(), variants.clone(), stats.clone())
            .await?;

        counter!("experiment_created_total").increment(1);
        info!(
            experiment_id = %experiment.id,
            job_id = %experiment.job_id,
            variants = variants.len(),
            "Created experiment"
        );

        Ok(ExperimentDetails {
            experiment,
            variants: variants
                .into_iter()
                .zip(stats)
                .map(|(variant, stat)| VariantDetails { variant, stat })
                .collect(),
        })
    }

    /// Fetch an experiment with its variants and stats.
    pub async fn get_experiment(&self, id: &ExperimentId) -> ExperimentResult<ExperimentDetails> {
        let experiment = self.fetch(id).await?;
        let variants = self
            .experiments
            .snapshot_variants(id)
            .await?
            .into_iter()
            .map(|(variant, stat)| VariantDetails { variant, stat })
            .collect();
        Ok(ExperimentDetails {
            experiment,
            variants,
        })
    }

    /// Apply a metrics batch. Each variant's counter update and posterior
    /// recompute is one atomic unit; items for unknown variants are skipped
    /// per the lenient ingestion rule.
    pub async fn ingest_metrics(
        &self,
        id: &ExperimentId,
        items: Vec<MetricsItem>,
    ) -> ExperimentResult<IngestSummary> {
        let experiment = self.fetch(id).await?;

        let mut summary = IngestSummary::default();
        for item in items {
            match self
                .experiments
                .apply_stat_delta(&experiment, &item.variant_id, &item.delta)
                .await?
            {
                Some(_) => summary.applied += 1,
                None => {
                    debug!(
                        experiment_id = %id,
                        variant_id = %item.variant_id,
                        "Skipping metrics for unknown variant"
                    );
                    counter!("experiment_metrics_skipped_total").increment(1);
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Recompute posteriors from a single consistent snapshot, recommend
    /// allocations, and promote the winner when the evidence and runtime
    /// gates are both satisfied.
    pub async fn decide(&self, id: &ExperimentId) -> ExperimentResult<Decision> {
        let experiment = self.fetch(id).await?;
        let snapshot = self.experiments.snapshot_variants(id).await?;

        let posteriors: Vec<VariantPosterior> = snapshot
            .iter()
            .map(|(_, stat)| {
                VariantPosterior::from_stat(
                    stat,
                    experiment.target_metric,
                    experiment.prior_alpha,
                    experiment.prior_beta,
                )
            })
            .collect();

        let allocations = recommend_allocations(&posteriors, DEFAULT_MIN_SHARE);

        let (state, promoted) = match experiment.state {
            ExperimentState::Running => {
                let runtime_ok = experiment.runtime_satisfied_at(Utc::now());
                match should_promote(&posteriors, experiment.min_impressions, runtime_ok) {
                    Some(promotion) => {
                        self.experiments.promote(id, &promotion.variant_id).await?;
                        counter!("experiment_promoted_total").increment(1);
                        info!(
                            experiment_id = %id,
                            variant_id = %promotion.variant_id,
                            posterior_mean = promotion.posterior_mean,
                            "Promoted winning variant"
                        );
                        (ExperimentState::Promoted, Some(promotion))
                    }
                    None => (ExperimentState::Running, None),
                }
            }
            // A promoted experiment keeps reporting its standing winner.
            ExperimentState::Promoted => {
                let standing = snapshot
                    .iter()
                    .find(|(variant, _)| variant.state == VariantState::Promoted)
                    .and_then(|(variant, _)| {
                        posteriors.iter().find(|p| p.variant_id == variant.id)
                    })
                    .map(|p| Promotion {
                        variant_id: p.variant_id.clone(),
                        posterior_mean: p.mean(),
                    });
                (ExperimentState::Promoted, standing)
            }
            other => (other, None),
        };

        Ok(Decision {
            experiment_id: id.clone(),
            state,
            allocations,
            promoted,
        })
    }

    async fn fetch(&self, id: &ExperimentId) -> ExperimentResult<Experiment> {
        self.experiments
            .get_experiment(id)
            .await?
            .ok_or_else(|| ExperimentError::ExperimentNotFound(id.clone()))
    }
}
