//! Liveness endpoint.
//!
//! Answers as long as the process is serving HTTP, whether or not the event
//! stream is currently connected. Use `/api/v1/connection` for that.

use axum::http::StatusCode;

/// `GET /health`
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: text/plain
///
/// OK
/// ```
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
