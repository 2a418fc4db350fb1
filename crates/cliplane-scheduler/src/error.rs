//! Scheduler error types.

use thiserror::Error;

use cliplane_models::{JobId, JobState};
use cliplane_store::StoreError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown plan: {0}. Use: express | priority | standard")]
    UnknownPlan(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
