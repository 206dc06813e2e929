//! # Synapse
//!
//! The `synapse` crate is the job transport between the query gateway and the
//! workers. A requester publishes a [`Job`] (a function identifier plus an opaque
//! JSON argument payload) and receives a [`JobFuture`] that resolves exactly once
//! with the [`WorkerResult`] envelope produced by whichever worker took the job.
//!
//! The crate knows nothing about corpora. Callers and workers agree on function
//! identifiers and payload shapes; the envelope carries the identifier of the
//! function that produced it so a mismatch is detected at decode time.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

pub mod broker;
pub mod envelope;
pub mod future;

pub use broker::{Broker, Delivery, JobQueue, MemoryBroker, PublishError};
pub use envelope::{EnvelopeError, JobError, WorkerResult};
pub use future::{FutureError, JobFuture};

/// One unit of dispatched work. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub function: String,
    pub args: Vec<u8>,
}

impl Job {
    /// Builds a job whose arguments are the JSON encoding of `args`.
    pub fn new<A: Serialize>(function: impl Into<String>, args: &A) -> Result<Self, serde_json::Error> {
        Ok(Job {
            id: Uuid::new_v4(),
            function: function.into(),
            args: serde_json::to_vec(args)?,
        })
    }

    /// Worker side: decode the argument payload.
    pub fn decode_args<A: DeserializeOwned>(&self) -> Result<A, serde_json::Error> {
        serde_json::from_slice(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        corpus_path: String,
        subc_path: Option<String>,
        flimit: i64,
    }

    #[test]
    fn test_args_reencode_byte_for_byte() {
        let args = Args {
            corpus_path: "/corpora/syn2020".to_string(),
            subc_path: Some("/split/syn2020/chunk_01.subc".to_string()),
            flimit: 3,
        };
        let job = Job::new("freqDistrib", &args).unwrap();
        let decoded: Args = job.decode_args().unwrap();
        assert_eq!(decoded, args);
        assert_eq!(serde_json::to_vec(&decoded).unwrap(), job.args);
    }

    #[test]
    fn test_jobs_get_distinct_ids() {
        let a = Job::new("corpusSize", &()).unwrap();
        let b = Job::new("corpusSize", &()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
