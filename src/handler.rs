//! Front door for everything that produces or consumes events.
//!
//! [`GerritHandler`] owns the listener registry, the receiving worker pool
//! and the outbound send queue. Stream connections post into its work queue;
//! adapters that receive events some other way call [`GerritHandler::post`]
//! or [`GerritHandler::trigger_event`] directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::events::{EventContext, Provider};
use crate::worker::{
    GerritEventListener, ListenerRegistry, QueueError, SendCommandQueue, Work, WorkQueue,
    WorkerPool,
};

/// How long shutdown waits for receiving workers.
const RECEIVING_SHUTDOWN_WAIT_SECS: u64 = 10;

pub struct GerritHandler {
    listeners: Arc<ListenerRegistry>,
    receiving: WorkerPool<Work>,
    send: Arc<SendCommandQueue>,
}

impl GerritHandler {
    /// Starts both worker pools.
    pub fn new(receiving_workers: usize, sending_workers: usize, queue_capacity: usize) -> Self {
        let listeners = Arc::new(ListenerRegistry::new());
        let receiving = WorkerPool::spawn(
            "receiving",
            receiving_workers,
            queue_capacity,
            Arc::clone(&listeners),
        );
        let send = Arc::new(SendCommandQueue::start(sending_workers));
        GerritHandler {
            listeners,
            receiving,
            send,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn GerritEventListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn GerritEventListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The receiving queue, for stream connections to post into.
    pub fn work_queue(&self) -> &WorkQueue<Work> {
        self.receiving.queue()
    }

    pub fn send_queue(&self) -> &Arc<SendCommandQueue> {
        &self.send
    }

    /// Queues a raw line as if it had been read from `provider`'s stream.
    pub async fn post(&self, line: impl Into<String>, provider: Provider) -> Result<(), QueueError> {
        self.receiving
            .queue()
            .submit(Work::StreamLine {
                line: line.into(),
                provider,
            })
            .await
    }

    /// Queues an already classified event.
    pub async fn trigger_event(&self, ctx: EventContext) -> Result<(), QueueError> {
        debug!(event = %ctx.event, "Queueing triggered event");
        self.receiving.queue().submit(Work::Event(ctx)).await
    }

    /// Notifies all listeners on the calling task, bypassing the queue.
    pub fn notify_listeners(&self, ctx: &EventContext) {
        self.listeners.notify_listeners(ctx);
    }

    /// Stops both pools. Items being processed are allowed to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.receiving
            .shutdown(Duration::from_secs(RECEIVING_SHUTDOWN_WAIT_SECS))
            .await;
        self.send.shutdown().await;
        info!("Event handler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{patchset_context, patchset_created_json};
    use crate::worker::{ListenerResult, OutboundCommand};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Keys {
        keys: Mutex<Vec<String>>,
        arrived: Notify,
    }

    impl GerritEventListener for Keys {
        fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult {
            self.keys
                .lock()
                .unwrap()
                .push(ctx.key().map(|k| k.to_string()).unwrap_or_default());
            self.arrived.notify_one();
            Ok(())
        }
    }

    impl Keys {
        async fn wait_for(&self, count: usize) -> Vec<String> {
            loop {
                {
                    let keys = self.keys.lock().unwrap();
                    if keys.len() >= count {
                        return keys.clone();
                    }
                }
                self.arrived.notified().await;
            }
        }
    }

    #[tokio::test]
    async fn posted_lines_reach_listeners() {
        let handler = GerritHandler::new(1, 1, 16);
        let keys = Arc::new(Keys::default());
        handler.add_listener(keys.clone());

        handler
            .post(
                patchset_created_json("proj", "main", 3, 4),
                Provider::new("gerrit", "localhost", 29418),
            )
            .await
            .unwrap();
        handler.trigger_event(patchset_context(5, 6)).await.unwrap();

        assert_eq!(keys.wait_for(2).await, vec!["3,4", "5,6"]);
        handler.shutdown().await;
    }

    #[tokio::test]
    async fn notify_listeners_is_synchronous() {
        let handler = GerritHandler::new(1, 1, 16);
        let keys = Arc::new(Keys::default());
        let as_dyn: Arc<dyn GerritEventListener> = keys.clone();
        handler.add_listener(Arc::clone(&as_dyn));

        handler.notify_listeners(&patchset_context(1, 2));
        assert_eq!(*keys.keys.lock().unwrap(), vec!["1,2"]);

        assert!(handler.remove_listener(&as_dyn));
        assert_eq!(handler.listener_count(), 0);
        handler.shutdown().await;
    }

    #[tokio::test]
    async fn send_queue_runs_commands() {
        let handler = GerritHandler::new(1, 1, 16);
        let done = Arc::new(Notify::new());
        let signal = Arc::clone(&done);
        handler
            .send_queue()
            .queue_command(OutboundCommand::new("ping", async move {
                signal.notify_one();
            }))
            .unwrap();
        done.notified().await;
        handler.shutdown().await;
    }

    #[tokio::test]
    async fn post_after_shutdown_fails() {
        let handler = GerritHandler::new(1, 1, 16);
        handler.shutdown().await;
        assert_eq!(
            handler.trigger_event(patchset_context(1, 1)).await,
            Err(QueueError::Closed)
        );
    }
}
