//! Route construction.

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers::{health_check, relay_handler};
use crate::state::AppState;

/// Build the application router: a health probe at `/` and the audio relay
/// WebSocket endpoint at `/ws`.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ws", get(relay_handler))
}
