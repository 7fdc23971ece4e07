//! FIFO work queues.
//!
//! A thin handle over a tokio channel. Bounded queues let producers either
//! wait for room ([`WorkQueue::submit`]) or fail fast
//! ([`WorkQueue::try_submit`]). Unbounded queues never push back, and only
//! fail once the pool has shut down. The receiving half is owned by a
//! [`super::WorkerPool`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur when enqueueing work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The pool has shut down.
    #[error("work queue closed")]
    Closed,

    /// The queue is at capacity.
    #[error("work queue full ({capacity} items)")]
    Full { capacity: usize },
}

enum Tx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded {
        tx: mpsc::UnboundedSender<T>,
        depth: Arc<AtomicUsize>,
    },
}

/// Producer handle to a FIFO queue. Cheap to clone.
pub struct WorkQueue<T> {
    tx: Tx<T>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        let tx = match &self.tx {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded { tx, depth } => Tx::Unbounded {
                tx: tx.clone(),
                depth: Arc::clone(depth),
            },
        };
        WorkQueue { tx }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Consumer half of a [`WorkQueue`].
pub struct WorkReceiver<T> {
    rx: Rx<T>,
}

enum Rx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded {
        rx: mpsc::UnboundedReceiver<T>,
        depth: Arc<AtomicUsize>,
    },
}

/// Creates a queue with room for `capacity` items.
pub(crate) fn bounded<T>(capacity: usize) -> (WorkQueue<T>, WorkReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        WorkQueue { tx: Tx::Bounded(tx) },
        WorkReceiver { rx: Rx::Bounded(rx) },
    )
}

/// Creates a queue that accepts items until its receiver is gone.
pub(crate) fn unbounded<T>() -> (WorkQueue<T>, WorkReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        WorkQueue {
            tx: Tx::Unbounded {
                tx,
                depth: Arc::clone(&depth),
            },
        },
        WorkReceiver {
            rx: Rx::Unbounded { rx, depth },
        },
    )
}

impl<T> WorkQueue<T> {
    /// Enqueues `item`, waiting for room if the queue is full.
    pub async fn submit(&self, item: T) -> Result<(), QueueError> {
        match &self.tx {
            Tx::Bounded(tx) => tx.send(item).await.map_err(|_| QueueError::Closed),
            Tx::Unbounded { .. } => self.try_submit(item),
        }
    }

    /// Enqueues `item` without waiting.
    pub fn try_submit(&self, item: T) -> Result<(), QueueError> {
        match &self.tx {
            Tx::Bounded(tx) => tx.try_send(item).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full {
                    capacity: tx.max_capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }),
            Tx::Unbounded { tx, depth } => {
                depth.fetch_add(1, Ordering::SeqCst);
                tx.send(item).map_err(|_| {
                    depth.fetch_sub(1, Ordering::SeqCst);
                    QueueError::Closed
                })
            }
        }
    }

    /// Number of items waiting to be taken.
    pub fn len(&self) -> usize {
        match &self.tx {
            Tx::Bounded(tx) => tx.max_capacity() - tx.capacity(),
            Tx::Unbounded { depth, .. } => depth.load(Ordering::SeqCst),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for an unbounded queue.
    pub fn capacity(&self) -> Option<usize> {
        match &self.tx {
            Tx::Bounded(tx) => Some(tx.max_capacity()),
            Tx::Unbounded { .. } => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded { tx, .. } => tx.is_closed(),
        }
    }
}

impl<T> WorkReceiver<T> {
    /// Waits for the next item. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded { rx, depth } => {
                let item = rx.recv().await;
                if item.is_some() {
                    depth.fetch_sub(1, Ordering::SeqCst);
                }
                item
            }
        }
    }

    /// Takes the next item if one is waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded { rx, depth } => {
                let item = rx.try_recv().ok();
                if item.is_some() {
                    depth.fetch_sub(1, Ordering::SeqCst);
                }
                item
            }
        }
    }
}
