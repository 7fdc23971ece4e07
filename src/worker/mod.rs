//! Queue and worker-pool dispatch.
//!
//! Raw lines and pre-classified events go onto one bounded FIFO queue that a
//! fixed pool of receiving workers drains. Each item is classified and handed
//! to every registered listener. Outbound notifications use a second pool of
//! the same shape.
//!
//! # Ordering
//!
//! Items are taken in FIFO order. With more than one worker, events for
//! different changes may finish in any order.
//!
//! # Module Structure
//!
//! - [`queue`]: Bounded FIFO queue handle
//! - [`pool`]: Generic worker pool with per-item panic containment
//! - [`work`]: The inbound work item
//! - [`listeners`]: Listener registration and fan-out
//! - [`send`]: Outbound command queue

pub mod listeners;
pub mod pool;
pub mod queue;
pub mod send;
pub mod work;


pub use listeners::{GerritEventListener, ListenerRegistry, ListenerResult};
pub use pool::{Perform, WorkerPool};
pub use queue::{QueueError, WorkQueue, WorkReceiver};
pub use send::{OutboundCommand, SEND_QUEUE_WARNING_THRESHOLD, SendCommandQueue, SendJob};
pub use work::Work;
