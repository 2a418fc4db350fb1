//! In-memory store backend.
//!
//! Test double and local-dev backend. A single `RwLock` write guard per
//! table group is the atomicity unit: idempotent creation, compare-and-set
//! transitions, per-variant delta application and promotion each happen
//! under one guard, which provides the serialization the trait contracts
//! require.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use cliplane_models::{
    Experiment, ExperimentId, ExperimentState, Job, JobEvent, JobId, JobSlaAudit, JobState,
    MetricsDelta, Variant, VariantId, VariantStat, VariantState,
};

use crate::error::{StoreError, StoreResult};
use crate::experiments::ExperimentStore;
use crate::jobs::{CreatedJob, JobStore};

#[derive(Default)]
struct JobTables {
    jobs: HashMap<JobId, Job>,
    events: Vec<JobEvent>,
    audits: HashMap<JobId, JobSlaAudit>,
    /// (org_id, idempotency_key) -> job id
    idempotency: HashMap<(String, String), JobId>,
}

#[derive(Default)]
struct ExperimentTables {
    experiments: HashMap<ExperimentId, Experiment>,
    variants: HashMap<VariantId, Variant>,
    stats: HashMap<VariantId, VariantStat>,
    /// experiment id -> variant ids in index order
    variant_order: HashMap<ExperimentId, Vec<VariantId>>,
}

/// In-memory implementation of both store contracts.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<JobTables>,
    experiments: RwLock<ExperimentTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: Job) -> StoreResult<CreatedJob> {
        let mut tables = self.jobs.write().await;

        if let Some(key) = &job.idempotency_key {
            let idem_key = (job.org_id.as_str().to_string(), key.clone());
            if let Some(existing_id) = tables.idempotency.get(&idem_key) {
                let existing = tables
                    .jobs
                    .get(existing_id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found(existing_id.to_string()))?;
                debug!(job_id = %existing.id, key = %key, "Idempotent replay hit");
                return Ok(CreatedJob::Existing(existing));
            }
            tables.idempotency.insert(idem_key, job.id.clone());
        }

        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::duplicate(job.id.to_string()));
        }
        tables.jobs.insert(job.id.clone(), job.clone());
        Ok(CreatedJob::Created(job))
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.jobs.get(id).cloned())
    }

    async fn update_job_state(
        &self,
        id: &JobId,
        from: JobState,
        to: JobState,
    ) -> StoreResult<Job> {
        let mut tables = self.jobs.write().await;
        let job = tables
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        if job.state != from {
            return Err(StoreError::conflict(format!(
                "job {} is {}, not {}",
                id, job.state, from
            )));
        }
        job.state = to;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn set_eta(&self, id: &JobId, eta_seconds: i64) -> StoreResult<()> {
        let mut tables = self.jobs.write().await;
        let job = tables
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        job.eta_seconds = Some(eta_seconds);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn active_jobs(&self) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.is_active())
            .cloned()
            .collect())
    }

    async fn append_event(&self, event: JobEvent) -> StoreResult<()> {
        self.jobs.write().await.events.push(event);
        Ok(())
    }

    async fn events_for_job(&self, id: &JobId) -> StoreResult<Vec<JobEvent>> {
        let tables = self.jobs.read().await;
        let mut events: Vec<JobEvent> = tables
            .events
            .iter()
            .filter(|e| &e.job_id == id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.at);
        Ok(events)
    }

    async fn insert_sla_audit(&self, audit: JobSlaAudit) -> StoreResult<bool> {
        let mut tables = self.jobs.write().await;
        if tables.audits.contains_key(&audit.job_id) {
            return Ok(false);
        }
        tables.audits.insert(audit.job_id.clone(), audit);
        Ok(true)
    }

    async fn sla_audit(&self, id: &JobId) -> StoreResult<Option<JobSlaAudit>> {
        Ok(self.jobs.read().await.audits.get(id).cloned())
    }
}

#[async_trait]
impl ExperimentStore for MemoryStore {
    async fn create_experiment(
        &self,
        experiment: Experiment,
        variants: Vec<Variant>,
        stats: Vec<VariantStat>,
    ) -> StoreResult<()> {
        let mut tables = self.experiments.write().await;
        if tables.experiments.contains_key(&experiment.id) {
            return Err(StoreError::duplicate(experiment.id.to_string()));
        }

        let mut ordered = variants.clone();
        ordered.sort_by_key(|v| v.index);
        tables.variant_order.insert(
            experiment.id.clone(),
            ordered.iter().map(|v| v.id.clone()).collect(),
        );
        for variant in variants {
            tables.variants.insert(variant.id.clone(), variant);
        }
        for stat in stats {
            tables.stats.insert(stat.variant_id.clone(), stat);
        }
        tables.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    async fn get_experiment(&self, id: &ExperimentId) -> StoreResult<Option<Experiment>> {
        Ok(self.experiments.read().await.experiments.get(id).cloned())
    }

    async fn snapshot_variants(
        &self,
        id: &ExperimentId,
    ) -> StoreResult<Vec<(Variant, VariantStat)>> {
        let tables = self.experiments.read().await;
        let order = tables
            .variant_order
            .get(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;

        let mut snapshot = Vec::with_capacity(order.len());
        for variant_id in order {
            let variant = tables
                .variants
                .get(variant_id)
                .ok_or_else(|| StoreError::not_found(variant_id.to_string()))?;
            let stat = tables
                .stats
                .get(variant_id)
                .ok_or_else(|| StoreError::not_found(variant_id.to_string()))?;
            snapshot.push((variant.clone(), stat.clone()));
        }
        Ok(snapshot)
    }

    async fn apply_stat_delta(
        &self,
        experiment: &Experiment,
        variant_id: &VariantId,
        delta: &MetricsDelta,
    ) -> StoreResult<Option<VariantStat>> {
        let mut tables = self.experiments.write().await;

        let owned = tables
            .variants
            .get(variant_id)
            .map(|v| v.experiment_id == experiment.id)
            .unwrap_or(false);
        if !owned {
            return Ok(None);
        }

        let stat = match tables.stats.get_mut(variant_id) {
            Some(stat) => stat,
            None => return Ok(None),
        };
        stat.apply_delta(
            delta,
            experiment.target_metric,
            experiment.prior_alpha,
            experiment.prior_beta,
        );
        Ok(Some(stat.clone()))
    }

    async fn promote(
        &self,
        experiment_id: &ExperimentId,
        variant_id: &VariantId,
    ) -> StoreResult<()> {
        let mut tables = self.experiments.write().await;

        match tables.variants.get(variant_id) {
            Some(v) if v.experiment_id == *experiment_id => {}
            _ => return Err(StoreError::not_found(variant_id.to_string())),
        }

        let experiment = tables
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| StoreError::not_found(experiment_id.to_string()))?;
        experiment.state = ExperimentState::Promoted;
        experiment.updated_at = Utc::now();

        if let Some(variant) = tables.variants.get_mut(variant_id) {
            variant.state = VariantState::Promoted;
        }
        Ok(())
    }
}
