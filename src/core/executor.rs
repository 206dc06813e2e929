//! Single-job calls and the scatter-gather executor.
//!
//! A gather publishes one job per shard and spawns one task per published
//! job. Each task waits for its envelope, decodes it outside any lock and then
//! folds it into the shared accumulator, holding the mutex only for that one
//! merge. Every spawned task reports back exactly once, also when it panics,
//! so a shard can never leave the gather short. Shards whose job could not be
//! published are accounted for up front.

use std::collections::HashMap;
use std::future::pending;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use prism::ShardSet;
use serde::{de::DeserializeOwned, Serialize};
use synapse::{Broker, EnvelopeError, JobFuture, WorkerResult};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::query::{self, QueryFunction};
use crate::core::results::Mergeable;
use crate::error::{Result, SwarmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Publish,
    Worker,
    Decode,
    Cancelled,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardFailure {
    pub shard: PathBuf,
    pub stage: FailureStage,
    pub reason: String,
}

/// Merged answer of an aggregate query plus an account of every shard.
#[derive(Debug, Serialize)]
pub struct Gathered<T> {
    #[serde(flatten)]
    pub result: T,
    pub shards: usize,
    pub merged: usize,
    pub failures: Vec<ShardFailure>,
    /// Set when cancellation or the deadline cut the wait short.
    pub partial: bool,
}

impl<T> Gathered<T> {
    pub fn is_complete(&self) -> bool {
        self.merged == self.shards
    }
}

/// One shard's share of an aggregate query.
#[derive(Debug, Clone)]
pub struct ShardTask<A> {
    pub shard: PathBuf,
    pub args: A,
}

type Outcome = std::result::Result<(), (FailureStage, String)>;

#[derive(Clone)]
pub struct Executor {
    broker: Arc<dyn Broker>,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Executor { broker, timeout: None }
    }

    /// Aggregate queries stop waiting after `timeout` and return what has been
    /// merged so far, marked partial.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publishes one job and waits for its result. Any failure is surfaced.
    pub async fn call<T, A>(&self, function: QueryFunction, args: &A) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        let job = query::job(function, args)?;
        debug!(job_id = %job.id, function = function.name(), "dispatching single job");
        let future = self.broker.publish(job).await?;
        let envelope = future.wait().await?;
        Ok(envelope.decode(function.name())?)
    }

    /// Runs `function` on every shard of `shards`, building each shard's
    /// arguments from its descriptor path.
    pub async fn scatter<T, A, F>(
        &self,
        function: QueryFunction,
        shards: &ShardSet,
        cancel: &CancellationToken,
        args: F,
    ) -> Result<Gathered<T>>
    where
        T: Mergeable,
        A: Serialize,
        F: Fn(&Path) -> A,
    {
        let tasks = shards
            .subcorpora
            .iter()
            .map(|shard| ShardTask {
                shard: shard.clone(),
                args: args(shard),
            })
            .collect();
        self.gather(function, tasks, cancel).await
    }

    pub async fn gather<T, A>(
        &self,
        function: QueryFunction,
        tasks: Vec<ShardTask<A>>,
        cancel: &CancellationToken,
    ) -> Result<Gathered<T>>
    where
        T: Mergeable,
        A: Serialize,
    {
        let total = tasks.len();
        let acc = Arc::new(Mutex::new(T::default()));
        let mut failures = Vec::new();
        let mut pending_shards: HashMap<usize, PathBuf> = HashMap::new();
        let mut set = JoinSet::new();

        for (idx, task) in tasks.into_iter().enumerate() {
            let published = match query::job(function, &task.args) {
                Ok(job) => self.broker.publish(job).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            let future = match published {
                Ok(future) => future,
                Err(reason) => {
                    warn!(shard = %task.shard.display(), function = function.name(), %reason, "failed to publish shard job");
                    failures.push(ShardFailure {
                        shard: task.shard,
                        stage: FailureStage::Publish,
                        reason,
                    });
                    continue;
                }
            };
            pending_shards.insert(idx, task.shard);
            let acc = acc.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let outcome = AssertUnwindSafe(settle(function, future, acc, cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err((FailureStage::Panicked, "shard task panicked".to_string())));
                (idx, outcome)
            });
        }

        if pending_shards.is_empty() && total > 0 {
            let reason = failures
                .last()
                .map(|f| f.reason.clone())
                .unwrap_or_default();
            return Err(SwarmError::NothingDispatched { shards: total, reason });
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut merged = 0;
        let mut partial = false;
        loop {
            tokio::select! {
                biased;
                joined = set.join_next() => match joined {
                    Some(Ok((idx, outcome))) => {
                        record(idx, outcome, &mut pending_shards, &mut merged, &mut failures);
                    }
                    Some(Err(e)) => warn!(error = %e, "shard task ended abnormally"),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    info!(function = function.name(), "gather cancelled, returning partial result");
                    partial = true;
                    break;
                }
                _ = sleep_until(deadline) => {
                    warn!(function = function.name(), "gather deadline passed, returning partial result");
                    partial = true;
                    break;
                }
            }
        }

        if partial {
            set.abort_all();
            while let Some(joined) = set.join_next().await {
                if let Ok((idx, outcome)) = joined {
                    record(idx, outcome, &mut pending_shards, &mut merged, &mut failures);
                }
            }
            for (_, shard) in pending_shards.drain() {
                failures.push(ShardFailure {
                    shard,
                    stage: FailureStage::Cancelled,
                    reason: "no result before the gather stopped".to_string(),
                });
            }
        }
        failures.sort_by(|a, b| a.shard.cmp(&b.shard));

        let result = match Arc::try_unwrap(acc) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock().await),
        };
        info!(
            function = function.name(),
            shards = total,
            merged,
            failed = failures.len(),
            partial,
            "gather finished"
        );
        Ok(Gathered {
            result,
            shards: total,
            merged,
            failures,
            partial,
        })
    }
}

async fn settle<T: Mergeable>(
    function: QueryFunction,
    future: JobFuture<WorkerResult>,
    acc: Arc<Mutex<T>>,
    cancel: CancellationToken,
) -> Outcome {
    let envelope = future
        .wait()
        .await
        .map_err(|e| (FailureStage::Worker, e.to_string()))?;
    let part: T = envelope.decode(function.name()).map_err(|e| match e {
        EnvelopeError::Worker(err) => (FailureStage::Worker, err.to_string()),
        other => (FailureStage::Decode, other.to_string()),
    })?;
    if cancel.is_cancelled() {
        return Err((FailureStage::Cancelled, "result arrived after cancellation".to_string()));
    }
    acc.lock().await.merge_with(part);
    Ok(())
}

fn record(
    idx: usize,
    outcome: Outcome,
    pending_shards: &mut HashMap<usize, PathBuf>,
    merged: &mut usize,
    failures: &mut Vec<ShardFailure>,
) {
    let Some(shard) = pending_shards.remove(&idx) else {
        return;
    };
    match outcome {
        Ok(()) => {
            debug!(shard = %shard.display(), "shard result merged");
            *merged += 1;
        }
        Err((stage, reason)) => {
            warn!(shard = %shard.display(), ?stage, %reason, "shard contributed nothing");
            failures.push(ShardFailure { shard, stage, reason });
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
