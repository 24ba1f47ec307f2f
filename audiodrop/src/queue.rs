use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::{JobRunner, Submission};

struct QueuedJob {
    id: Uuid,
    submission: Submission,
}

/// Bounded job queue drained by a fixed number of concurrent workers.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl JobQueue {
    /// Spawn the worker pool. At most `max_concurrent` jobs run at once and
    /// at most `capacity` more wait; beyond that [`JobQueue::submit`] refuses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(runner: Arc<JobRunner>, max_concurrent: usize, capacity: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(Self::worker_pool(rx, runner, max_concurrent));

        info!(capacity, max_concurrent, "job queue initialized");
        Self { tx }
    }

    /// Enqueue a job without waiting.
    pub fn submit(&self, id: Uuid, submission: Submission) -> Result<()> {
        self.tx
            .try_send(QueuedJob { id, submission })
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    warn!(job_id = %id, "job queue is full, rejecting job");
                    Error::QueueFull
                }
                TrySendError::Closed(_) => Error::QueueClosed,
            })?;
        info!(job_id = %id, "job queued");
        Ok(())
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<QueuedJob>,
        runner: Arc<JobRunner>,
        max_concurrent: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        while let Some(job) = rx.recv().await {
            // The semaphore is never closed.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let runner = runner.clone();

            tokio::spawn(async move {
                let _permit = permit;
                runner.run(job.id, job.submission).await;
            });
        }
    }
}
