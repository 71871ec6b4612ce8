//! Downstream WebSocket handler: one session per browser connection.
//!
//! Each session bridges exactly one downstream socket to exactly one
//! upstream Transcribe connection. Binary downstream messages are raw
//! little-endian f32 sample buffers; transcripts go back as text messages.
//! Sessions never retry: any upstream failure ends the session with an
//! abnormal close carrying the error detail, and the client decides
//! whether to reconnect.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::audio::{pcm_encode, samples_from_f32_le};
use crate::core::transcribe::{TranscribeConfig, TranscribeStream, UpstreamEvent};
use crate::errors::RelayError;
use crate::state::AppState;

/// Maximum WebSocket message size (1 MB). At 48kHz f32 mono this is over
/// five seconds of audio per message, far beyond any sane capture chunk.
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Lifecycle of one relay session.
///
/// Transitions only move forward: Idle -> Connecting -> Streaming ->
/// Closing -> Closed, with failure short-circuiting to Closing from any
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayPhase {
    Idle,
    Connecting,
    Streaming,
    Closing,
    Closed,
}

/// Tracks one session's phase and terminal status.
pub(crate) struct RelaySession {
    id: Uuid,
    phase: RelayPhase,
    error: Option<String>,
}

impl RelaySession {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RelayPhase::Idle,
            error: None,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn phase(&self) -> RelayPhase {
        self.phase
    }

    pub(crate) fn begin_connect(&mut self) {
        self.phase = RelayPhase::Connecting;
    }

    pub(crate) fn mark_streaming(&mut self) {
        self.phase = RelayPhase::Streaming;
    }

    pub(crate) fn begin_close(&mut self) {
        if self.phase != RelayPhase::Closed {
            self.phase = RelayPhase::Closing;
        }
    }

    /// Record a session-fatal error. The first failure wins; later errors
    /// during teardown do not overwrite the one the client should see. Only
    /// upstream-originated detail is forwarded in the close reason.
    pub(crate) fn fail(&mut self, error: &RelayError) {
        if self.error.is_none() {
            self.error = Some(if error.is_upstream() {
                error.to_string()
            } else {
                "Internal relay error".to_string()
            });
        }
        self.begin_close();
    }

    pub(crate) fn mark_closed(&mut self) {
        self.phase = RelayPhase::Closed;
    }

    pub(crate) fn close_code(&self) -> u16 {
        if self.error.is_some() {
            close_code::ERROR
        } else {
            close_code::NORMAL
        }
    }

    /// Close frame for the downstream socket: normal closure for a clean
    /// end, abnormal with the error detail as the reason otherwise.
    pub(crate) fn close_frame(&self) -> CloseFrame {
        CloseFrame {
            code: self.close_code(),
            reason: self.error.clone().unwrap_or_default().into(),
        }
    }
}

/// Relay WebSocket handler: upgrades the connection and hands it to the
/// session loop.
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

/// What to do with a downstream message that arrives while the upstream
/// handshake is still in flight.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConnectingAction {
    /// Audio before the upstream opens is discarded at arrival time. It is
    /// never queued and never sent once the connection is up; live audio
    /// that missed the stream start is worthless.
    DropAudio,
    /// Client gave up during the handshake; close without error.
    Close,
    /// Control traffic, nothing to do.
    Ignore,
}

pub(crate) fn connecting_action(message: &Message) -> ConnectingAction {
    match message {
        Message::Binary(_) => ConnectingAction::DropAudio,
        Message::Close(_) => ConnectingAction::Close,
        _ => ConnectingAction::Ignore,
    }
}

/// Run one relay session to completion.
async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut session = RelaySession::new();
    info!(session_id = %session.id(), "Relay WebSocket connection established");

    let config = TranscribeConfig::from_relay(&state.config);

    session.begin_connect();
    let (mut sender, mut receiver) = socket.split();

    // The downstream socket is polled throughout the handshake so chunks
    // sent early are discarded as they arrive instead of sitting in the
    // receive buffer until Streaming begins.
    let connect = TranscribeStream::connect(&config);
    tokio::pin!(connect);

    let (mut upstream, mut upstream_events) = loop {
        select! {
            connected = &mut connect => match connected {
                Ok(pair) => break pair,
                Err(e) => {
                    error!(session_id = %session.id(), "Upstream connection failed: {e}");
                    session.fail(&e);
                    let _ = sender.send(Message::Close(Some(session.close_frame()))).await;
                    session.mark_closed();
                    return;
                }
            },

            downstream = receiver.next() => match downstream {
                Some(Ok(message)) => match connecting_action(&message) {
                    ConnectingAction::DropAudio => {
                        debug!(
                            session_id = %session.id(),
                            "Discarding audio chunk received before upstream opened"
                        );
                    }
                    ConnectingAction::Close => {
                        info!(session_id = %session.id(), "Client closed during upstream handshake");
                        session.begin_close();
                        let _ = sender.send(Message::Close(Some(session.close_frame()))).await;
                        session.mark_closed();
                        return;
                    }
                    ConnectingAction::Ignore => {}
                },
                Some(Err(e)) => {
                    warn!(session_id = %session.id(), "Downstream socket error during handshake: {e}");
                    session.begin_close();
                    session.mark_closed();
                    return;
                }
                None => {
                    info!(session_id = %session.id(), "Downstream gone during upstream handshake");
                    session.begin_close();
                    session.mark_closed();
                    return;
                }
            },
        }
    };
    session.mark_streaming();

    while session.phase() == RelayPhase::Streaming {
        select! {
            downstream = receiver.next() => match downstream {
                Some(Ok(Message::Binary(chunk))) => {
                    let samples = samples_from_f32_le(&chunk);
                    let pcm = pcm_encode(&samples);
                    if let Err(e) = upstream.send_audio(pcm).await {
                        warn!(session_id = %session.id(), "Rejected audio chunk: {e}");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(session_id = %session.id(), "Client closed the connection: {frame:?}");
                    session.begin_close();
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(other)) => {
                    debug!(session_id = %session.id(), "Ignoring non-audio message: {other:?}");
                }
                Some(Err(e)) => {
                    warn!(session_id = %session.id(), "Downstream socket error: {e}");
                    session.begin_close();
                }
                None => {
                    info!(session_id = %session.id(), "Downstream socket stream ended");
                    session.begin_close();
                }
            },

            event = upstream_events.recv() => match event {
                Some(UpstreamEvent::Transcript(text)) => {
                    // Forwarded inline so transcripts reach the client in
                    // upstream arrival order.
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        warn!(session_id = %session.id(), "Downstream send failed, closing session");
                        session.begin_close();
                    }
                }
                Some(UpstreamEvent::Error(e)) => {
                    error!(session_id = %session.id(), "Upstream error: {e}");
                    session.fail(&e);
                }
                Some(UpstreamEvent::Closed) | None => {
                    info!(session_id = %session.id(), "Upstream connection ended");
                    session.begin_close();
                }
            },
        }
    }

    // Closing: end the upstream stream and flush transcripts already in
    // flight before the final close frame.
    upstream.finish();
    while let Some(event) = upstream_events.recv().await {
        match event {
            UpstreamEvent::Transcript(text) => {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            UpstreamEvent::Error(e) => {
                session.fail(&e);
                break;
            }
            UpstreamEvent::Closed => break,
        }
    }
    upstream.disconnect().await;

    let _ = sender.send(Message::Close(Some(session.close_frame()))).await;
    session.mark_closed();
    info!(
        session_id = %session.id(),
        code = session.close_code(),
        "Relay session closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_idle() {
        let session = RelaySession::new();
        assert_eq!(session.phase(), RelayPhase::Idle);
        assert_eq!(session.close_code(), close_code::NORMAL);
    }

    #[test]
    fn test_clean_lifecycle() {
        let mut session = RelaySession::new();
        session.begin_connect();
        assert_eq!(session.phase(), RelayPhase::Connecting);
        session.mark_streaming();
        assert_eq!(session.phase(), RelayPhase::Streaming);
        session.begin_close();
        assert_eq!(session.phase(), RelayPhase::Closing);
        session.mark_closed();
        assert_eq!(session.phase(), RelayPhase::Closed);

        let frame = session.close_frame();
        assert_eq!(frame.code, close_code::NORMAL);
        assert!(frame.reason.is_empty());
    }

    #[test]
    fn test_failure_produces_abnormal_close_with_reason() {
        let mut session = RelaySession::new();
        session.begin_connect();
        session.fail(&RelayError::UpstreamUnavailable(
            "Connection timed out after 10s".to_string(),
        ));

        assert_eq!(session.phase(), RelayPhase::Closing);
        let frame = session.close_frame();
        assert_eq!(frame.code, close_code::ERROR);
        assert!(frame.reason.contains("timed out"));
    }

    #[test]
    fn test_first_error_wins() {
        let mut session = RelaySession::new();
        session.fail(&RelayError::UpstreamException(
            "BadRequestException: bad audio".to_string(),
        ));
        session.fail(&RelayError::Transport("late teardown error".to_string()));

        assert!(session.close_frame().reason.contains("BadRequestException"));
    }

    #[test]
    fn test_audio_before_upstream_open_discarded() {
        // Chunks sent while the handshake is in flight are dropped at
        // arrival time, never queued for delivery after the stream opens.
        for _ in 0..3 {
            let chunk = Message::Binary(vec![0u8; 640].into());
            assert_eq!(connecting_action(&chunk), ConnectingAction::DropAudio);
        }
    }

    #[test]
    fn test_close_during_handshake_ends_session() {
        assert_eq!(
            connecting_action(&Message::Close(None)),
            ConnectingAction::Close
        );
    }

    #[test]
    fn test_control_traffic_during_handshake_ignored() {
        assert_eq!(
            connecting_action(&Message::Ping(vec![].into())),
            ConnectingAction::Ignore
        );
        assert_eq!(
            connecting_action(&Message::Text("hello".into())),
            ConnectingAction::Ignore
        );
    }

    #[test]
    fn test_non_upstream_error_detail_not_forwarded() {
        let mut session = RelaySession::new();
        session.fail(&RelayError::Config("AWS_ACCESS_KEY_ID is required".to_string()));

        let frame = session.close_frame();
        assert_eq!(frame.code, close_code::ERROR);
        assert!(!frame.reason.contains("AWS_ACCESS_KEY_ID"));
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = RelaySession::new();
        session.mark_closed();
        session.begin_close();
        assert_eq!(session.phase(), RelayPhase::Closed);
    }
}
