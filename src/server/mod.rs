//! Diagnostics HTTP server.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /api/v1/memory` - Every tracked patchset and its builds, as JSON
//! - `GET /api/v1/changes/{change}/{patchset}` - Build progress for one patchset
//! - `GET /api/v1/connection` - Whether the event stream is connected

use std::sync::Arc;

pub mod health;
pub mod status;

pub use health::health_handler;
pub use status::{
    PatchSetStatus, StatusError, connection_handler, memory_handler, patchset_handler,
};

use crate::memory::BuildMemory;
use crate::stream::ConnectionState;

/// Shared application state, passed to handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    memory: Arc<BuildMemory>,
    connection: ConnectionState,
}

impl AppState {
    pub fn new(memory: Arc<BuildMemory>, connection: ConnectionState) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { memory, connection }),
        }
    }

    pub fn memory(&self) -> &Arc<BuildMemory> {
        &self.inner.memory
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.inner.connection
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/memory", get(memory_handler))
        .route("/api/v1/changes/{change}/{patchset}", get(patchset_handler))
        .route("/api/v1/connection", get(connection_handler))
        .with_state(app_state)
}
