use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Job, JobFuture, WorkerResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("broker is closed, job '{0}' was not published")]
    Closed(String),

    #[error("malformed job: {0}")]
    Malformed(String),
}

/// Publishing side of the job queue.
///
/// A successful publish guarantees that the returned future resolves at most
/// once, and exactly once if a worker completes the job. Retries, timeouts and
/// worker liveness are the caller's business.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, job: Job) -> Result<JobFuture<WorkerResult>, PublishError>;
}

/// A job handed to a worker together with its reply channel.
#[derive(Debug)]
pub struct Delivery {
    pub job: Job,
    reply: Option<oneshot::Sender<WorkerResult>>,
    in_flight: Arc<DashMap<Uuid, (String, Instant)>>,
}

impl Delivery {
    /// Sends the result back to the publisher. Returns false when the
    /// publisher stopped waiting.
    pub fn resolve(mut self, result: WorkerResult) -> bool {
        match self.reply.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some((_, (function, published))) = self.in_flight.remove(&self.job.id) {
            debug!(
                job_id = %self.job.id,
                function = %function,
                elapsed_ms = published.elapsed().as_millis() as u64,
                "job left the queue"
            );
        }
        if self.reply.is_some() {
            warn!(job_id = %self.job.id, function = %self.job.function, "job dropped without a result");
        }
    }
}

/// Consuming side of a [`MemoryBroker`]. Clones share one queue, so any number
/// of workers can drain it concurrently.
#[derive(Clone)]
pub struct JobQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl JobQueue {
    /// Next job, or `None` once every broker handle is gone and the queue is
    /// drained.
    pub async fn next(&self) -> Option<Delivery> {
        self.rx.lock().await.recv().await
    }
}

/// In-process broker backed by an unbounded channel.
#[derive(Clone)]
pub struct MemoryBroker {
    tx: mpsc::UnboundedSender<Delivery>,
    in_flight: Arc<DashMap<Uuid, (String, Instant)>>,
}

impl MemoryBroker {
    pub fn new() -> (Self, JobQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = MemoryBroker {
            tx,
            in_flight: Arc::new(DashMap::new()),
        };
        let queue = JobQueue {
            rx: Arc::new(Mutex::new(rx)),
        };
        (broker, queue)
    }

    /// Number of published jobs no worker has finished with yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, job: Job) -> Result<JobFuture<WorkerResult>, PublishError> {
        if job.function.trim().is_empty() {
            return Err(PublishError::Malformed(format!("job {} has no function", job.id)));
        }
        let (reply, future) = JobFuture::channel(job.id.to_string());
        let id = job.id;
        let function = job.function.clone();
        self.in_flight.insert(id, (function.clone(), Instant::now()));
        let delivery = Delivery {
            job,
            reply: Some(reply),
            in_flight: self.in_flight.clone(),
        };
        if let Err(mpsc::error::SendError(mut undelivered)) = self.tx.send(delivery) {
            // nobody will ever answer, keep the Drop impl quiet
            undelivered.reply = None;
            return Err(PublishError::Closed(function));
        }
        debug!(job_id = %id, function = %function, "job published");
        Ok(future)
    }
}
