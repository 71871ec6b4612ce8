//! Amazon Transcribe streaming upstream client.
//!
//! This module owns the cloud-facing leg of the relay: it derives a presigned
//! WebSocket URL, connects with `tokio-tungstenite`, wraps outbound PCM in
//! event-stream `AudioEvent` frames, and decodes inbound frames into
//! transcript text.
//!
//! # Architecture
//!
//! ```text
//! send_audio() ──► audio_tx (mpsc) ──► connection task ──► wss://transcribestreaming...
//!                                           │
//!                     event_rx (mpsc) ◄─────┘  Transcript / Error / Closed
//! ```
//!
//! The connection task is the only owner of the upstream socket; the relay
//! handler consumes `UpstreamEvent`s from the channel it gets back from
//! [`TranscribeStream::connect`].

mod client;
mod config;
mod messages;

#[cfg(test)]
mod tests;

pub use client::{TranscribeStream, UpstreamEvent};
pub use config::{
    DEFAULT_EXPIRES_SECS, DEFAULT_MEDIA_ENCODING, DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE,
    MIN_SAMPLE_RATE, TRANSCRIBE_WS_PATH, TranscribeConfig,
};
pub use messages::{Alternative, TranscribeResult, Transcript, TranscriptEvent, UpstreamException};
