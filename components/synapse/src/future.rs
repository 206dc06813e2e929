use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FutureError {
    /// The producing side went away without ever resolving the job.
    #[error("job {0} was abandoned before it produced a result")]
    Abandoned(String),
}

/// Single-resolution wait handle bound to one published job.
///
/// `wait` takes `self`, so a future can only be consumed once. If the producer
/// is dropped without resolving (worker pool gone, broker shut down) `wait`
/// returns [`FutureError::Abandoned`] instead of blocking forever.
#[derive(Debug)]
pub struct JobFuture<T> {
    label: String,
    rx: oneshot::Receiver<T>,
}

impl<T> JobFuture<T> {
    /// Creates a connected resolver/future pair.
    pub fn channel(label: impl Into<String>) -> (oneshot::Sender<T>, JobFuture<T>) {
        let (tx, rx) = oneshot::channel();
        (tx, JobFuture { label: label.into(), rx })
    }

    /// Identifier of the job this future is bound to.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn wait(self) -> Result<T, FutureError> {
        self.rx.await.map_err(|_| FutureError::Abandoned(self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_with_sent_value() {
        let (tx, fut) = JobFuture::<u32>::channel("job-1");
        tokio::spawn(async move {
            let _ = tx.send(42);
        });
        assert_eq!(fut.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_dropped_producer_is_reported() {
        let (tx, fut) = JobFuture::<u32>::channel("job-2");
        drop(tx);
        assert_eq!(fut.wait().await, Err(FutureError::Abandoned("job-2".to_string())));
    }
}
