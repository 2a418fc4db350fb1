//! Experiment engine error types.

use thiserror::Error;

use cliplane_models::{ExperimentId, JobId};
use cliplane_store::StoreError;

pub type ExperimentResult<T> = Result<T, ExperimentError>;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(ExperimentId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid experiment: {0}")]
    InvalidExperiment(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ExperimentError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidExperiment(msg.into())
    }
}
