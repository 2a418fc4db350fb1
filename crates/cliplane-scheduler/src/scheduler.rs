//! Lane assignment and the job state machine.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use cliplane_models::{Job, JobEvent, JobId, JobSlaAudit, JobState, OrgId, PlanCatalog};
use cliplane_store::{CreatedJob, JobStore, StoreError};

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::eta;
use crate::events::{StateChange, StateChangeBus};

/// Admission request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubmitJob {
    /// Owning organization
    pub org_id: OrgId,
    /// Source media URL
    pub source_url: String,
    /// Input length in minutes
    pub input_minutes: u32,
    /// Plan id string, e.g. `"express"`
    pub plan_id: String,
    /// Optional retry key, unique per organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// A job together with its transition timeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDetails {
    pub job: Job,
    /// All transition events, ordered by time
    pub timeline: Vec<JobEvent>,
}

/// Priority-lane scheduler over an external job store.
///
/// Holds no job state of its own: every operation reads a snapshot from the
/// store and writes back through it.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    plans: PlanCatalog,
    config: SchedulerConfig,
    changes: StateChangeBus,
}

impl Scheduler {
    /// Scheduler over the built-in plan catalog and default throughput.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            plans: PlanCatalog::builtin(),
            config: SchedulerConfig::default(),
            changes: StateChangeBus::default(),
        }
    }

    /// Substitute the plan catalog.
    pub fn with_plans(mut self, plans: PlanCatalog) -> Self {
        self.plans = plans;
        self
    }

    /// Substitute the throughput configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to job state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Admit a job: validate against its plan, assign the plan's lane,
    /// record the QUEUED event and compute the initial ETA.
    ///
    /// A replayed `idempotency_key` returns the stored job unchanged.
    pub async fn submit(&self, request: SubmitJob) -> SchedulerResult<Job> {
        let plan = self
            .plans
            .resolve(&request.plan_id)
            .ok_or_else(|| SchedulerError::UnknownPlan(request.plan_id.clone()))?;

        if Url::parse(&request.source_url).is_err() {
            return Err(SchedulerError::invalid_input("sourceUrl must be a valid URL"));
        }
        if request.input_minutes < 1 || request.input_minutes > plan.max_input_minutes {
            return Err(SchedulerError::invalid_input(format!(
                "inputMinutes must be 1..{} for {}",
                plan.max_input_minutes, plan.id
            )));
        }

        let job = Job::queued(
            request.org_id,
            request.source_url,
            request.input_minutes,
            plan,
            request.idempotency_key,
        );
        let mut job = match self.store.create_job(job).await? {
            CreatedJob::Existing(existing) => {
                debug!(job_id = %existing.id, "Duplicate submission, returning existing job");
                return Ok(existing);
            }
            CreatedJob::Created(job) => job,
        };

        self.store
            .append_event(JobEvent::new(job.id.clone(), JobState::Queued, None))
            .await?;

        let snapshot = self.store.active_jobs().await?;
        let eta = eta::compute_eta_seconds(
            &job,
            &snapshot,
            &self.plans,
            self.config.throughput_for(job.lane),
        );
        self.store.set_eta(&job.id, eta).await?;
        job.eta_seconds = Some(eta);

        counter!("job_submitted_total").increment(1);
        info!(job_id = %job.id, lane = %job.lane, eta_seconds = eta, "Admitted job");
        self.publish_change(&job);
        Ok(job)
    }

    /// Apply one state transition.
    ///
    /// Terminal transitions freeze the job's ETA and record its SLA audit.
    pub async fn transition(
        &self,
        job_id: &JobId,
        new_state: JobState,
        detail: Option<serde_json::Value>,
    ) -> SchedulerResult<Job> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.clone()))?;

        if !job.state.can_transition_to(new_state) {
            return Err(SchedulerError::IllegalTransition {
                from: job.state,
                to: new_state,
            });
        }

        let updated = match self.store.update_job_state(job_id, job.state, new_state).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict(_)) => {
                // Lost a race with a concurrent transition; report against
                // the state that actually holds now.
                let fresh = self
                    .store
                    .get_job(job_id)
                    .await?
                    .ok_or_else(|| SchedulerError::JobNotFound(job_id.clone()))?;
                return Err(SchedulerError::IllegalTransition {
                    from: fresh.state,
                    to: new_state,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .append_event(JobEvent::new(job_id.clone(), new_state, detail))
            .await?;
        counter!("job_transition_total").increment(1);
        info!(job_id = %job_id, from = %job.state, to = %new_state, "Job transition");

        if new_state.is_terminal() {
            self.record_sla_audit(&updated).await?;
        }

        self.publish_change(&updated);
        Ok(updated)
    }

    /// Fetch a job with its timeline. Non-terminal jobs with no stored ETA
    /// get a freshly computed one; the read path persists nothing.
    pub async fn get_job(&self, job_id: &JobId) -> SchedulerResult<JobDetails> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.clone()))?;
        let timeline = self.store.events_for_job(job_id).await?;

        if !job.is_terminal() && job.eta_seconds.is_none() {
            let snapshot = self.store.active_jobs().await?;
            job.eta_seconds = Some(eta::compute_eta_seconds(
                &job,
                &snapshot,
                &self.plans,
                self.config.throughput_for(job.lane),
            ));
        }
        Ok(JobDetails { job, timeline })
    }

    /// Recompute and persist the ETA of a non-terminal job. A terminal
    /// job's ETA stays frozen at its last computed value.
    pub async fn refresh_eta(&self, job_id: &JobId) -> SchedulerResult<Job> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.clone()))?;
        if job.is_terminal() {
            return Ok(job);
        }

        let snapshot = self.store.active_jobs().await?;
        let eta = eta::compute_eta_seconds(
            &job,
            &snapshot,
            &self.plans,
            self.config.throughput_for(job.lane),
        );
        self.store.set_eta(&job.id, eta).await?;
        job.eta_seconds = Some(eta);
        Ok(job)
    }

    /// Aggregate queue view, grouped by lane.
    pub async fn queue_status(&self) -> SchedulerResult<eta::QueueStatus> {
        let snapshot = self.store.active_jobs().await?;
        Ok(eta::queue_status(&snapshot, &self.config))
    }

    /// Compute and store the SLA audit for a job that just went terminal.
    ///
    /// Target is the ETA in force at admission (plan-derived when no ETA
    /// was ever stored); actual is QUEUED-to-terminal wall clock. First
    /// writer wins, so the audit is recorded exactly once per job.
    async fn record_sla_audit(&self, job: &Job) -> SchedulerResult<()> {
        let events = self.store.events_for_job(&job.id).await?;
        let queued_at = events
            .iter()
            .find(|e| e.state == JobState::Queued)
            .map(|e| e.at)
            .unwrap_or(job.created_at);
        let terminal_at = events
            .iter()
            .rev()
            .find(|e| e.state.is_terminal())
            .map(|e| e.at)
            .unwrap_or_else(Utc::now);

        let target_seconds = job.eta_seconds.unwrap_or_else(|| {
            (eta::expected_minutes(job, &self.plans).round() as i64) * 60
        });
        let actual_seconds = (terminal_at - queued_at).num_seconds();

        let audit = JobSlaAudit::evaluate(job.id.clone(), target_seconds, actual_seconds);
        if audit.breached {
            counter!("job_sla_breach_total").increment(1);
            warn!(
                job_id = %job.id,
                target_seconds,
                actual_seconds,
                "SLA breached"
            );
        }

        if !self.store.insert_sla_audit(audit).await? {
            debug!(job_id = %job.id, "SLA audit already recorded");
        }
        Ok(())
    }

    fn publish_change(&self, job: &Job) {
        self.changes.publish(StateChange {
            job_id: job.id.clone(),
            state: job.state,
            eta_seconds: job.eta_seconds,
            at: Utc::now(),
        });
    }
}
