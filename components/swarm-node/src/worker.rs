use std::sync::Arc;

use corpus_swarm::{Executor, SwarmConfig};
use futures::future::join_all;
use judge::{CorpusEngine, Judge, VerticalEngine};
use synapse::{JobQueue, MemoryBroker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Worker tasks draining one job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn spawn<E: CorpusEngine>(queue: JobQueue, judge: Judge<E>, num_workers: usize, cancel: CancellationToken) -> Self {
        let handles = (0..num_workers)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, queue.clone(), judge.clone(), cancel.clone())))
            .collect();
        info!(num_workers, "worker pool started");
        WorkerPool { handles, cancel }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Stops taking new jobs and waits for the jobs in progress.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for res in join_all(self.handles).await {
            if let Err(e) = res {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn run_worker<E: CorpusEngine>(worker_id: usize, queue: JobQueue, judge: Judge<E>, cancel: CancellationToken) {
    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.next() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };
        debug!(worker_id, job_id = %delivery.job.id, function = %delivery.job.function, "job taken");
        let result = judge.execute(&delivery.job).await;
        if !delivery.resolve(result) {
            debug!(worker_id, "publisher stopped waiting, result discarded");
        }
    }
    debug!(worker_id, "worker exiting");
}

/// In-process broker plus `num_workers` workers over the vertical engine.
pub fn start_local(config: &SwarmConfig, cancel: CancellationToken) -> (Executor, WorkerPool) {
    let (broker, queue) = MemoryBroker::new();
    let judge = Judge::new(VerticalEngine::new(config.workers.positional_attrs.clone()));
    let pool = WorkerPool::spawn(queue, judge, config.workers.num_workers, cancel);
    let executor = Executor::new(Arc::new(broker)).with_timeout(config.gather_timeout());
    (executor, pool)
}
