//! Outbound command queue.
//!
//! Notifications that react to build progress run on their own small pool so
//! a slow review server never holds up inbound event processing. The queue is
//! unbounded: a notification is only ever refused after shutdown.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::pool::{Perform, WorkerPool};
use super::queue::QueueError;

/// Backlog size at which queueing starts to warn.
pub const SEND_QUEUE_WARNING_THRESHOLD: usize = 20;

/// How long shutdown waits for commands in progress.
const SEND_QUEUE_SHUTDOWN_WAIT_SECS: u64 = 30;

pub type SendJob = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A named job to run against the outside world.
pub struct OutboundCommand {
    pub name: String,
    job: SendJob,
}

impl OutboundCommand {
    pub fn new(name: impl Into<String>, job: impl Future<Output = ()> + Send + 'static) -> Self {
        OutboundCommand {
            name: name.into(),
            job: Box::pin(job),
        }
    }
}

impl fmt::Debug for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundCommand")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct SendRunner;

impl Perform<OutboundCommand> for SendRunner {
    async fn perform(&self, command: OutboundCommand) {
        debug!(command = %command.name, "Running outbound command");
        command.job.await;
    }
}

/// Worker pool for [`OutboundCommand`]s.
pub struct SendCommandQueue {
    pool: WorkerPool<OutboundCommand>,
}

impl SendCommandQueue {
    pub fn start(workers: usize) -> Self {
        SendCommandQueue {
            pool: WorkerPool::spawn_unbounded("sending", workers, Arc::new(SendRunner)),
        }
    }

    /// Queues `command` without waiting. Fails only once shut down.
    pub fn queue_command(&self, command: OutboundCommand) -> Result<(), QueueError> {
        let backlog = self.backlog();
        if backlog >= SEND_QUEUE_WARNING_THRESHOLD {
            warn!(backlog, "Send queue backlog is growing");
        }
        self.pool.queue().try_submit(command)
    }

    /// Commands waiting to run.
    pub fn backlog(&self) -> usize {
        self.pool.queue().len()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub async fn shutdown(&self) {
        self.pool
            .shutdown(Duration::from_secs(SEND_QUEUE_SHUTDOWN_WAIT_SECS))
            .await;
    }
}
