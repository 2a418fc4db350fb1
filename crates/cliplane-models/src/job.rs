//! Jobs and the job lifecycle state machine.
//!
//! The pipeline is strictly linear; the three failure states are reachable
//! from any non-terminal state. The legal transition set is data
//! (`LEGAL_TRANSITIONS`), so the whole reachability graph is testable as one
//! table.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{JobId, Lane, OrgId, Plan, PlanId};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Record exists but has not been admitted to the queue.
    Created,
    /// Admitted, waiting for a worker.
    Queued,
    /// Source media is being fetched.
    Ingesting,
    /// Speech-to-text pass.
    Transcribing,
    /// Highlight analysis.
    Analyzing,
    /// Cut list assembly.
    Editing,
    /// Clip rendering.
    Rendering,
    /// Output upload.
    Uploading,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Exceeded its processing deadline.
    TimedOut,
    /// Canceled by the caller.
    Canceled,
}

/// The processing pipeline in its only legal order.
pub const PIPELINE: [JobState; 9] = [
    JobState::Created,
    JobState::Queued,
    JobState::Ingesting,
    JobState::Transcribing,
    JobState::Analyzing,
    JobState::Editing,
    JobState::Rendering,
    JobState::Uploading,
    JobState::Completed,
];

/// Every legal `(from, to)` transition: one step along the pipeline, or a
/// failure exit from any non-terminal state.
pub const LEGAL_TRANSITIONS: &[(JobState, JobState)] = &[
    // pipeline steps
    (JobState::Created, JobState::Queued),
    (JobState::Queued, JobState::Ingesting),
    (JobState::Ingesting, JobState::Transcribing),
    (JobState::Transcribing, JobState::Analyzing),
    (JobState::Analyzing, JobState::Editing),
    (JobState::Editing, JobState::Rendering),
    (JobState::Rendering, JobState::Uploading),
    (JobState::Uploading, JobState::Completed),
    // failure exits
    (JobState::Created, JobState::Failed),
    (JobState::Created, JobState::TimedOut),
    (JobState::Created, JobState::Canceled),
    (JobState::Queued, JobState::Failed),
    (JobState::Queued, JobState::TimedOut),
    (JobState::Queued, JobState::Canceled),
    (JobState::Ingesting, JobState::Failed),
    (JobState::Ingesting, JobState::TimedOut),
    (JobState::Ingesting, JobState::Canceled),
    (JobState::Transcribing, JobState::Failed),
    (JobState::Transcribing, JobState::TimedOut),
    (JobState::Transcribing, JobState::Canceled),
    (JobState::Analyzing, JobState::Failed),
    (JobState::Analyzing, JobState::TimedOut),
    (JobState::Analyzing, JobState::Canceled),
    (JobState::Editing, JobState::Failed),
    (JobState::Editing, JobState::TimedOut),
    (JobState::Editing, JobState::Canceled),
    (JobState::Rendering, JobState::Failed),
    (JobState::Rendering, JobState::TimedOut),
    (JobState::Rendering, JobState::Canceled),
    (JobState::Uploading, JobState::Failed),
    (JobState::Uploading, JobState::TimedOut),
    (JobState::Uploading, JobState::Canceled),
];

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Queued => "QUEUED",
            JobState::Ingesting => "INGESTING",
            JobState::Transcribing => "TRANSCRIBING",
            JobState::Analyzing => "ANALYZING",
            JobState::Editing => "EDITING",
            JobState::Rendering => "RENDERING",
            JobState::Uploading => "UPLOADING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::TimedOut => "TIMED_OUT",
            JobState::Canceled => "CANCELED",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut | JobState::Canceled
        )
    }

    /// Active jobs occupy queue capacity: QUEUED through UPLOADING.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Queued
                | JobState::Ingesting
                | JobState::Transcribing
                | JobState::Analyzing
                | JobState::Editing
                | JobState::Rendering
                | JobState::Uploading
        )
    }

    /// Whether `to` is legal from this state.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        LEGAL_TRANSITIONS.contains(&(*self, to))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work: one source video to cut into clips.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Owning organization
    pub org_id: OrgId,
    /// Source media URL
    pub source_url: String,
    /// Input length in minutes (> 0)
    pub input_minutes: u32,
    /// Plan the job was admitted under
    pub plan_id: PlanId,
    /// Priority lane, copied from the plan at admission and immutable after
    pub lane: Lane,
    /// Current lifecycle state
    pub state: JobState,
    /// Admission timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Last computed ETA, in seconds. Frozen once the job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<i64>,
    /// Caller-supplied retry key, unique per organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Job {
    /// Admit a new job into the queue under the given plan.
    pub fn queued(
        org_id: OrgId,
        source_url: impl Into<String>,
        input_minutes: u32,
        plan: &Plan,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            org_id,
            source_url: source_url.into(),
            input_minutes,
            plan_id: plan.id,
            lane: plan.lane,
            state: JobState::Queued,
            created_at: now,
            updated_at: now,
            eta_seconds: None,
            idempotency_key,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Append-only record of one state transition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobEvent {
    /// Job the event belongs to
    pub job_id: JobId,
    /// State entered
    pub state: JobState,
    /// Optional structured payload (e.g. failure cause)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// When the transition happened
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: JobId, state: JobState, detail: Option<serde_json::Value>) -> Self {
        Self {
            job_id,
            state,
            detail,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_steps_are_legal() {
        for pair in PIPELINE.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn skipping_pipeline_stages_is_illegal() {
        assert!(!JobState::Queued.can_transition_to(JobState::Analyzing));
        assert!(!JobState::Ingesting.can_transition_to(JobState::Rendering));
        assert!(!JobState::Created.can_transition_to(JobState::Completed));
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for state in PIPELINE.iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_transition_to(JobState::Failed), "{state}");
            assert!(state.can_transition_to(JobState::TimedOut), "{state}");
            assert!(state.can_transition_to(JobState::Canceled), "{state}");
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for terminal in [
            JobState::Completed,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Canceled,
        ] {
            assert!(
                LEGAL_TRANSITIONS.iter().all(|(from, _)| *from != terminal),
                "{terminal} must not appear as a source state"
            );
        }
    }

    #[test]
    fn completed_cannot_reenter_pipeline() {
        assert!(!JobState::Completed.can_transition_to(JobState::Rendering));
    }

    #[test]
    fn backward_transitions_are_illegal() {
        assert!(!JobState::Rendering.can_transition_to(JobState::Editing));
        assert!(!JobState::Queued.can_transition_to(JobState::Created));
    }

    #[test]
    fn admitted_job_starts_queued_with_plan_lane() {
        let plan = Plan::for_id(PlanId::Express);
        let job = Job::queued(
            OrgId::from_string("org-1"),
            "https://example.com/video.mp4",
            10,
            &plan,
            None,
        );
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.lane, Lane::P0);
        assert_eq!(job.plan_id, PlanId::Express);
        assert!(job.is_active());
        assert!(!job.is_terminal());
    }

    #[test]
    fn job_state_wire_format_is_screaming_case() {
        let json = serde_json::to_string(&JobState::TimedOut).expect("serialize");
        assert_eq!(json, "\"TIMED_OUT\"");
    }
}
