use prism::PrismError;
use synapse::{EnvelopeError, FutureError, JobError, PublishError};
use thiserror::Error;

use crate::core::query::ERR_ROWS_RANGE_OUT_OF_CONC;

/// Error kinds surfaced by the query core.
///
/// Shard-level dispatch, worker and decode failures only reach the caller on
/// single-job paths. Aggregate queries record them in
/// [`Gathered::failures`](crate::Gathered) instead.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Malformed caller input; nothing was dispatched.
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("failed to dispatch job: {0}")]
    Dispatch(#[from] PublishError),

    /// Not a single shard job of an aggregate query could be published.
    #[error("none of {shards} shard jobs could be dispatched: {reason}")]
    NothingDispatched { shards: usize, reason: String },

    #[error("worker failed: {0}")]
    Worker(JobError),

    #[error("rows range is out of concordance size")]
    RowsOutOfRange,

    #[error("failed to decode worker result: {0}")]
    Decode(String),

    #[error("{0}")]
    Abandoned(#[from] FutureError),

    #[error("partitioning failed: {0}")]
    Partition(PrismError),

    #[error("failed to encode job arguments: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<PrismError> for SwarmError {
    fn from(err: PrismError) -> Self {
        match err {
            PrismError::Conflict { .. } => SwarmError::Conflict(err.to_string()),
            PrismError::NotFound { .. } => SwarmError::NotFound(err.to_string()),
            PrismError::Validation(msg) => SwarmError::Validation(msg),
            other => SwarmError::Partition(other),
        }
    }
}

impl From<EnvelopeError> for SwarmError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Worker(job_err)
                if job_err.code.as_deref() == Some(ERR_ROWS_RANGE_OUT_OF_CONC) =>
            {
                SwarmError::RowsOutOfRange
            }
            EnvelopeError::Worker(job_err) => SwarmError::Worker(job_err),
            other => SwarmError::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
