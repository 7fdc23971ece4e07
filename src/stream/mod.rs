//! The persistent event-stream connection.
//!
//! # Module Structure
//!
//! - [`connector`] - Opening a line-readable transport ([`Connector`], [`TcpConnector`])
//! - [`connection`] - The reader loop and reconnect coordinator ([`StreamConnection`])
//! - [`backoff`] - Retry delays between connection attempts
//!
//! Exactly one connection is open at a time. Every non-empty line becomes a
//! work item on the receiving queue, tagged with the [`Provider`] that sent it.

pub mod backoff;
pub mod connection;
pub mod connector;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::events::Provider;

pub use backoff::ReconnectConfig;
pub use connection::StreamConnection;
pub use connector::{ConnectionError, Connector, TcpConnector};

/// Something that can be asked to drop and reopen its connection.
pub trait Coordinator: Send + Sync {
    /// Closes the current connection and schedules reopening it.
    /// Safe to call from any task, any number of times.
    fn reconnect(&self);
}

/// Notified when the stream connection goes up or down.
pub trait ConnectionListener: Send + Sync {
    fn connection_established(&self, _provider: &Provider) {}

    fn connection_down(&self, _provider: &Provider) {}
}

/// Shared, observable connection status.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    inner: Arc<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    connected: AtomicBool,
    reconnect_count: AtomicU64,
}

/// Point-in-time view of [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_count: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Number of reconnects requested so far, including coalesced ones.
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnect_count.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            reconnect_count: self.reconnect_count(),
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn record_reconnect(&self) {
        self.inner.reconnect_count.fetch_add(1, Ordering::SeqCst);
    }
}
