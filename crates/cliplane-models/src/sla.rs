//! SLA audit records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Post-hoc comparison of a job's promised ETA to its actual completion time.
///
/// Written exactly once, at the job's terminal transition, and immutable
/// afterwards. The core only flags a breach; `remedy` is populated by an
/// external policy (e.g. a credit refund) and never produced here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSlaAudit {
    /// Job the audit belongs to (unique)
    pub job_id: JobId,
    /// ETA in force at admission, in seconds
    pub target_seconds: i64,
    /// Observed wall-clock from QUEUED to the terminal event, in seconds
    pub actual_seconds: i64,
    /// Whether the job overran its target
    pub breached: bool,
    /// Externally populated remedy note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<serde_json::Value>,
}

impl JobSlaAudit {
    /// Evaluate target vs actual. `breached` is derived, `remedy` left empty.
    pub fn evaluate(job_id: JobId, target_seconds: i64, actual_seconds: i64) -> Self {
        Self {
            job_id,
            target_seconds,
            actual_seconds,
            breached: actual_seconds > target_seconds,
            remedy: None,
        }
    }
}
