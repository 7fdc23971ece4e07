//! Read-only views of the build memory and stream connection.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use super::AppState;
use crate::memory::BuildMemoryReport;
use crate::stream::ConnectionStatus;
use crate::types::PatchSetKey;

/// Errors from the status endpoints.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Nothing is being tracked for this patchset.
    #[error("no builds tracked for patchset {0}")]
    NotFound(PatchSetKey),
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        let status = match &self {
            StatusError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

/// Progress of the builds for one patchset.
#[derive(Debug, Clone, Serialize)]
pub struct PatchSetStatus {
    pub status_report: String,
    pub started: usize,
    pub total: usize,
    pub all_started: bool,
    pub all_completed: bool,
}

/// `GET /api/v1/memory`
pub async fn memory_handler(State(app_state): State<AppState>) -> Json<BuildMemoryReport> {
    Json(app_state.memory().report())
}

/// `GET /api/v1/changes/{change}/{patchset}`
///
/// - 200 OK with a [`PatchSetStatus`] body
/// - 404 Not Found if no builds are tracked for the patchset
pub async fn patchset_handler(
    State(app_state): State<AppState>,
    Path((change, patchset)): Path<(u64, u64)>,
) -> Result<Json<PatchSetStatus>, StatusError> {
    let key = PatchSetKey::new(change, patchset);
    let imprint = app_state
        .memory()
        .imprint(key)
        .ok_or(StatusError::NotFound(key))?;
    let stats = imprint.builds_started_stats();
    Ok(Json(PatchSetStatus {
        status_report: imprint.status_report(),
        started: stats.started,
        total: stats.total,
        all_started: imprint.is_all_builds_started(),
        all_completed: imprint.is_all_builds_completed(),
    }))
}

/// `GET /api/v1/connection`
pub async fn connection_handler(State(app_state): State<AppState>) -> Json<ConnectionStatus> {
    Json(app_state.connection().status())
}
