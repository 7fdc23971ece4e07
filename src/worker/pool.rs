//! Fixed-size worker pool draining one bounded queue.
//!
//! Each worker loops: take one item, perform it, repeat. Items are taken in
//! FIFO order, but with more than one worker their processing may finish in
//! any order.
//!
//! # Failure containment
//!
//! Every item runs in its own task. A panic inside `perform` is caught at
//! that task boundary and logged, and the worker goes on to the next item,
//! so a bad item never shrinks the pool.
//!
//! # Shutdown
//!
//! Cancelling the pool interrupts workers waiting for their next item. An
//! item already being performed runs to completion.

use std::future::Future;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::{WorkQueue, WorkReceiver, bounded, unbounded};

/// Performs work items taken from a pool's queue.
pub trait Perform<T>: Send + Sync + 'static {
    fn perform(&self, item: T) -> impl Future<Output = ()> + Send;
}

/// A named pool of workers sharing one queue.
pub struct WorkerPool<T> {
    name: &'static str,
    queue: WorkQueue<T>,
    worker_count: usize,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts `workers` workers (at least one) over a queue of `capacity`.
    pub fn spawn<H: Perform<T>>(
        name: &'static str,
        workers: usize,
        capacity: usize,
        handler: Arc<H>,
    ) -> Self {
        let (queue, rx) = bounded(capacity);
        Self::start(name, workers, queue, rx, handler)
    }

    /// Starts `workers` workers (at least one) over a queue that never
    /// rejects work while the pool is running.
    pub fn spawn_unbounded<H: Perform<T>>(
        name: &'static str,
        workers: usize,
        handler: Arc<H>,
    ) -> Self {
        let (queue, rx) = unbounded();
        Self::start(name, workers, queue, rx, handler)
    }

    fn start<H: Perform<T>>(
        name: &'static str,
        workers: usize,
        queue: WorkQueue<T>,
        rx: WorkReceiver<T>,
        handler: Arc<H>,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    name,
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&handler),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            pool = name,
            workers = workers.len(),
            capacity = ?queue.capacity(),
            "Worker pool started"
        );
        WorkerPool {
            name,
            queue,
            worker_count: workers.len(),
            workers: std::sync::Mutex::new(workers),
            cancel,
        }
    }

    /// Producer handle for this pool's queue.
    pub fn queue(&self) -> &WorkQueue<T> {
        &self.queue
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stops all workers, waiting up to `timeout` for items in progress.
    /// Later calls return immediately.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if workers.is_empty() {
            return;
        }
        let join_all = async {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!(pool = self.name, error = %e, "Worker task failed");
                }
            }
        };
        if tokio::time::timeout(timeout, join_all).await.is_err() {
            warn!(
                pool = self.name,
                timeout_secs = timeout.as_secs(),
                "Timed out waiting for workers to finish"
            );
        } else {
            info!(pool = self.name, "Worker pool stopped");
        }
    }
}

async fn next_item<T>(rx: &Mutex<WorkReceiver<T>>) -> Option<T> {
    rx.lock().await.recv().await
}

async fn worker_loop<T, H>(
    pool: &'static str,
    id: usize,
    rx: Arc<Mutex<WorkReceiver<T>>>,
    handler: Arc<H>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    H: Perform<T>,
{
    debug!(pool, worker = id, "Worker started");
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = next_item(&rx) => match item {
                Some(item) => item,
                None => break,
            },
        };

        let handler = Arc::clone(&handler);
        let outcome = tokio::spawn(async move { handler.perform(item).await }).await;
        if let Err(e) = outcome {
            if e.is_panic() {
                error!(pool, worker = id, "Work item panicked; worker continues");
            } else {
                warn!(pool, worker = id, error = %e, "Work item was cancelled");
            }
        }
    }
    debug!(pool, worker = id, "Worker stopped");
}
