//! Health check endpoint.

use axum::Json;
use serde_json::{Value, json};

/// Liveness probe. Deliberately does not touch AWS: a healthy relay with
/// bad credentials still reports healthy here and fails per-session.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "transcribe-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
