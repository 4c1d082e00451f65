use thiserror::Error;

use crate::models::{JobKind, JobState};

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised by the job status store, the result cache and the runner
#[derive(Debug, Error)]
pub enum JobError {
    /// Persistence write or read failed
    #[error("Store error: {0}")]
    Store(String),

    /// A row with the same key already exists
    #[error("Job status already exists for {subject}/{kind}")]
    Conflict { subject: String, kind: JobKind },

    /// The row was replaced or deleted by a newer job
    #[error("Job status for {subject}/{kind} was superseded")]
    Superseded { subject: String, kind: JobKind },

    /// The requested lifecycle transition is not allowed
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },

    /// Details payload does not match the job kind
    #[error("Details for a {details} job cannot be stored on a {kind} job")]
    DetailsMismatch { kind: JobKind, details: JobKind },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sea_orm::DbErr> for JobError {
    fn from(err: sea_orm::DbErr) -> Self {
        JobError::Store(err.to_string())
    }
}
