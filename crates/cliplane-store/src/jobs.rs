//! Job store contract.
//!
//! The scheduler holds no mutable state of its own; everything durable lives
//! behind this trait. The methods encode the consistency points the
//! scheduler relies on: idempotent creation is serialized by the store's
//! uniqueness constraint, and state transitions are compare-and-set so no
//! two transitions can apply concurrently to one job.

use async_trait::async_trait;

use cliplane_models::{Job, JobEvent, JobId, JobSlaAudit, JobState};

use crate::error::StoreResult;

/// Outcome of an idempotent job creation.
#[derive(Debug, Clone)]
pub enum CreatedJob {
    /// A new job row was inserted.
    Created(Job),
    /// A job with the same `(org_id, idempotency_key)` already existed;
    /// it is returned unchanged.
    Existing(Job),
}

impl CreatedJob {
    pub fn job(&self) -> &Job {
        match self {
            CreatedJob::Created(job) | CreatedJob::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            CreatedJob::Created(job) | CreatedJob::Existing(job) => job,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, CreatedJob::Created(_))
    }
}

/// Durable record of jobs, their events and SLA audits.
///
/// Jobs are never deleted; they are retained indefinitely for audit.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, enforcing `(org_id, idempotency_key)` uniqueness.
    ///
    /// Concurrent callers racing on the same key must all observe the same
    /// resulting job; the uniqueness constraint is the serialization point.
    async fn create_job(&self, job: Job) -> StoreResult<CreatedJob>;

    /// Fetch a job by id.
    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Compare-and-set state change: fails with `Conflict` when the job's
    /// current state is no longer `from`. Bumps `updated_at`.
    async fn update_job_state(&self, id: &JobId, from: JobState, to: JobState)
        -> StoreResult<Job>;

    /// Persist a freshly computed ETA.
    async fn set_eta(&self, id: &JobId, eta_seconds: i64) -> StoreResult<()>;

    /// Snapshot of all jobs in active states (QUEUED through UPLOADING).
    async fn active_jobs(&self) -> StoreResult<Vec<Job>>;

    /// Append one immutable event row.
    async fn append_event(&self, event: JobEvent) -> StoreResult<()>;

    /// All events for a job, ordered by `at`.
    async fn events_for_job(&self, id: &JobId) -> StoreResult<Vec<JobEvent>>;

    /// Insert the job's SLA audit. First writer wins: returns `false`
    /// without writing when an audit already exists.
    async fn insert_sla_audit(&self, audit: JobSlaAudit) -> StoreResult<bool>;

    /// Fetch the SLA audit for a job, if computed.
    async fn sla_audit(&self, id: &JobId) -> StoreResult<Option<JobSlaAudit>>;
}
