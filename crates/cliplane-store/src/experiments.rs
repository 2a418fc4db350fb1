//! Experiment store contract.

use async_trait::async_trait;

use cliplane_models::{
    Experiment, ExperimentId, MetricsDelta, Variant, VariantId, VariantStat,
};

use crate::error::StoreResult;

/// Durable record of experiments, variants and variant statistics.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Insert an experiment with its variants and their zeroed stats as one
    /// atomic write.
    async fn create_experiment(
        &self,
        experiment: Experiment,
        variants: Vec<Variant>,
        stats: Vec<VariantStat>,
    ) -> StoreResult<()>;

    /// Fetch an experiment by id.
    async fn get_experiment(&self, id: &ExperimentId) -> StoreResult<Option<Experiment>>;

    /// All variants of an experiment with their stats, ordered by variant
    /// index, read as one consistent snapshot. Posteriors compared by
    /// `decide` must come from a single call.
    async fn snapshot_variants(
        &self,
        id: &ExperimentId,
    ) -> StoreResult<Vec<(Variant, VariantStat)>>;

    /// Atomically accumulate a metrics delta into one variant's counters and
    /// recompute its posterior under the experiment's metric and priors.
    ///
    /// Returns `None` when the variant is unknown or belongs to a different
    /// experiment; callers skip such items per the lenient ingestion rule.
    async fn apply_stat_delta(
        &self,
        experiment: &Experiment,
        variant_id: &VariantId,
        delta: &MetricsDelta,
    ) -> StoreResult<Option<VariantStat>>;

    /// Flip the experiment and the winning variant to PROMOTED in one
    /// write. Sibling variants keep their prior state.
    async fn promote(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> StoreResult<()>;
}
