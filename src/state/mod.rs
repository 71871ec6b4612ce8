//! Shared application state.

use crate::config::RelayConfig;

/// State shared across all downstream connections.
///
/// The relay holds no per-session state here; each WebSocket session owns
/// its upstream connection outright, so the shared state is just the
/// validated configuration every session derives its parameters from.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}
