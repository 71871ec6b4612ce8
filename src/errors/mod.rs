//! Error types for the relay server.
//!
//! Centralized error taxonomy covering configuration, upstream connection,
//! event-stream framing, and socket transport failures. Framing and transport
//! errors terminate only the affected session, never the whole process.

use thiserror::Error;

use crate::core::eventstream::FrameError;
use crate::core::signer::SignerError;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Error type for the audio relay bridge
#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing or invalid credentials/endpoint. Fatal at startup, surfaces
    /// before any connection attempt.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream connection failed or timed out. Ends the session; the
    /// downstream client may re-initiate, we never retry automatically.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Event-stream frame failed checksum or length validation. A corrupt
    /// frame invalidates framing alignment for subsequent bytes, so the
    /// session ends without retry.
    #[error("Corrupt event-stream frame: {0}")]
    FrameCorrupt(#[from] FrameError),

    /// Either socket errored asynchronously.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream service reported a streaming exception.
    #[error("Streaming exception: {0}")]
    UpstreamException(String),

    /// Presigned URL derivation failed (configuration class).
    #[error("Request signing failed: {0}")]
    Signing(#[from] SignerError),
}

impl RelayError {
    /// Whether this error originated on the upstream leg and should have its
    /// detail forwarded to the downstream client.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RelayError::UpstreamUnavailable(_)
                | RelayError::FrameCorrupt(_)
                | RelayError::UpstreamException(_)
        )
    }
}
