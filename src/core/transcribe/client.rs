//! WebSocket client for the Transcribe streaming endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use super::config::TranscribeConfig;
use super::messages::{TranscriptEvent, UpstreamException};
use crate::core::eventstream::{self, Frame, MESSAGE_TYPE_EVENT, MESSAGE_TYPE_EXCEPTION};
use crate::core::signer::build_presigned_url;
use crate::errors::{RelayError, RelayResult};

/// How long to wait for the upstream TLS + WebSocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall bound on draining final transcripts after end-of-stream.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `disconnect` waits for the connection task to wind down.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded audio queue depth. Backpressure, not buffering: a stalled
/// upstream should slow the reader, not grow memory.
const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// Event queue depth toward the relay handler.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Maximum accepted audio chunk size (sanity check). At 48kHz mono 16-bit
/// PCM this is over two seconds of audio per chunk.
const MAX_AUDIO_CHUNK_SIZE: usize = 256 * 1024;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Events the connection task reports back to the relay handler.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A transcript text extracted from an event frame.
    Transcript(String),
    /// The upstream leg failed; the session should end with this error.
    Error(RelayError),
    /// The upstream connection is gone (always the final event).
    Closed,
}

/// What to do with one decoded inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameDisposition {
    /// Forward this transcript text downstream.
    Transcript(String),
    /// Nothing to forward (keep-alive, empty results, unknown event type).
    Ignore,
}

/// Handle to one live Transcribe streaming connection.
///
/// Owns the channels into the connection task; the task owns the socket.
/// Dropping the handle signals shutdown, which sends the end-of-stream
/// marker and a close frame before the task exits.
pub struct TranscribeStream {
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
    is_connected: Arc<AtomicBool>,
}

impl TranscribeStream {
    /// Presign the endpoint URL, connect, and spawn the connection task.
    ///
    /// Returns the stream handle and the event channel the relay handler
    /// consumes. Fails with [`RelayError::UpstreamUnavailable`] when the
    /// handshake errors or exceeds [`CONNECT_TIMEOUT`].
    pub async fn connect(
        config: &TranscribeConfig,
    ) -> RelayResult<(Self, mpsc::Receiver<UpstreamEvent>)> {
        config.validate()?;

        let url = build_presigned_url(
            &config.credentials(),
            &config.presign_request(),
            SystemTime::now(),
        )?;

        let (ws_stream, _response) = match timeout(CONNECT_TIMEOUT, connect_async(url)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "Failed to connect to Transcribe: {e}"
                )));
            }
            Err(_) => {
                return Err(RelayError::UpstreamUnavailable(format!(
                    "Connection timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                )));
            }
        };

        info!(host = %config.endpoint_host, "Connected to Transcribe streaming endpoint");

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<UpstreamEvent>(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let is_connected = Arc::new(AtomicBool::new(true));
        let connected_flag = is_connected.clone();

        let connection_handle = tokio::spawn(async move {
            let (mut ws_sink, mut ws_source) = ws_stream.split();

            loop {
                tokio::select! {
                    chunk = audio_rx.recv() => match chunk {
                        Some(pcm) => {
                            let encoded = eventstream::encode(&Frame::audio_event(pcm));
                            if let Err(e) = ws_sink.send(Message::Binary(encoded.into())).await {
                                let err = RelayError::Transport(format!(
                                    "Failed to send audio upstream: {e}"
                                ));
                                error!("{err}");
                                let _ = event_tx.try_send(UpstreamEvent::Error(err));
                                break;
                            }
                        }
                        // Audio producer gone: treat as end of stream.
                        None => {
                            finish_stream(&mut ws_sink, &mut ws_source, &event_tx).await;
                            break;
                        }
                    },

                    incoming = ws_source.next() => {
                        if !handle_upstream_message(incoming, &event_tx).await {
                            break;
                        }
                    }

                    _ = &mut shutdown_rx => {
                        finish_stream(&mut ws_sink, &mut ws_source, &event_tx).await;
                        break;
                    }
                }
            }

            connected_flag.store(false, Ordering::Release);
            let _ = event_tx.try_send(UpstreamEvent::Closed);
            info!("Transcribe upstream connection closed");
        });

        Ok((
            Self {
                audio_tx: Some(audio_tx),
                shutdown_tx: Some(shutdown_tx),
                connection_handle: Some(connection_handle),
                is_connected,
            },
            event_rx,
        ))
    }

    pub fn is_ready(&self) -> bool {
        self.is_connected.load(Ordering::Acquire) && self.audio_tx.is_some()
    }

    /// Queue a PCM chunk for upstream delivery.
    ///
    /// Chunks arriving while the connection is down are dropped silently:
    /// live audio is only useful live, and the downstream client keeps
    /// producing regardless of upstream state.
    pub async fn send_audio(&self, pcm: Bytes) -> RelayResult<()> {
        if pcm.len() > MAX_AUDIO_CHUNK_SIZE {
            return Err(RelayError::Transport(format!(
                "Audio chunk of {} bytes exceeds maximum {} bytes",
                pcm.len(),
                MAX_AUDIO_CHUNK_SIZE
            )));
        }

        if !self.is_ready() {
            debug!("Dropping {} byte audio chunk, upstream not connected", pcm.len());
            return Ok(());
        }

        if let Some(audio_tx) = &self.audio_tx
            && audio_tx.send(pcm).await.is_err()
        {
            // Connection task already exited; the chunk is dropped and the
            // Closed event will reach the handler through the event channel.
            debug!("Dropped audio chunk, connection task has exited");
        }
        Ok(())
    }

    /// Signal end of stream: the task sends the empty end-of-stream audio
    /// frame, closes the socket, and drains remaining transcripts.
    pub fn finish(&mut self) {
        self.audio_tx = None;
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }

    /// Finish and wait for the connection task to exit.
    pub async fn disconnect(&mut self) {
        self.finish();
        if let Some(handle) = self.connection_handle.take()
            && timeout(DISCONNECT_TIMEOUT, handle).await.is_err()
        {
            warn!("Timed out waiting for upstream connection task to exit");
        }
        self.is_connected.store(false, Ordering::Release);
    }
}

impl Drop for TranscribeStream {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Process one inbound WebSocket message. Returns `false` when the
/// connection loop should stop.
async fn handle_upstream_message(
    incoming: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    event_tx: &mpsc::Sender<UpstreamEvent>,
) -> bool {
    match incoming {
        Some(Ok(Message::Binary(data))) => {
            let outcome = eventstream::decode(&data)
                .map_err(RelayError::from)
                .and_then(|frame| classify_frame(&frame));
            match outcome {
                Ok(FrameDisposition::Transcript(text)) => {
                    debug!("Upstream transcript: {text}");
                    if event_tx.send(UpstreamEvent::Transcript(text)).await.is_err() {
                        warn!("Event channel closed, stopping upstream reader");
                        return false;
                    }
                    true
                }
                Ok(FrameDisposition::Ignore) => true,
                Err(e) => {
                    error!("Upstream frame error: {e}");
                    let _ = event_tx.try_send(UpstreamEvent::Error(e));
                    false
                }
            }
        }
        Some(Ok(Message::Close(close_frame))) => {
            info!("Transcribe closed the connection: {close_frame:?}");
            false
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => true,
        Some(Ok(other)) => {
            debug!("Ignoring unexpected upstream message: {other:?}");
            true
        }
        Some(Err(e)) => {
            let err = RelayError::Transport(format!("Upstream socket error: {e}"));
            error!("{err}");
            let _ = event_tx.try_send(UpstreamEvent::Error(err));
            false
        }
        None => {
            info!("Upstream socket stream ended");
            false
        }
    }
}

/// Graceful end of stream: empty audio event as the end marker, then a
/// close frame, then a bounded drain of any in-flight transcripts.
async fn finish_stream(
    ws_sink: &mut WsSink,
    ws_source: &mut WsSource,
    event_tx: &mpsc::Sender<UpstreamEvent>,
) {
    let end_marker = eventstream::encode(&Frame::audio_event(Bytes::new()));
    if let Err(e) = ws_sink.send(Message::Binary(end_marker.into())).await {
        debug!("Failed to send end-of-stream marker: {e}");
    }
    let _ = ws_sink.send(Message::Close(None)).await;

    drain_upstream(ws_source, event_tx).await;
}

/// Drain in-flight transcripts under one overall deadline. The bound is on
/// the whole drain, not per message, so an upstream that keeps producing
/// cannot hold a session in its closing phase past the window.
async fn drain_upstream<S>(ws_source: &mut S, event_tx: &mpsc::Sender<UpstreamEvent>)
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = Instant::now() + FLUSH_TIMEOUT;
    while Instant::now() < deadline {
        match timeout_at(deadline, ws_source.next()).await {
            Ok(incoming) => {
                if !handle_upstream_message(incoming, event_tx).await {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// Decide what one decoded frame means for the relay.
///
/// Transcript extraction follows the service's nesting: the first result's
/// first (highest-confidence) alternative. Frames without results are
/// keep-alives and are ignored. Exception frames become session-fatal
/// errors carrying the upstream's own message.
pub(crate) fn classify_frame(frame: &Frame) -> Result<FrameDisposition, RelayError> {
    match frame.message_type() {
        Some(MESSAGE_TYPE_EVENT) => {
            // A payload that is not transcript-shaped is skipped, not fatal:
            // framing alignment is intact, only this event is unusable.
            let event: TranscriptEvent = match serde_json::from_slice(frame.payload()) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Ignoring malformed transcript payload: {e}");
                    return Ok(FrameDisposition::Ignore);
                }
            };
            Ok(match event.best_transcript() {
                Some(text) => FrameDisposition::Transcript(text.to_string()),
                None => FrameDisposition::Ignore,
            })
        }
        Some(MESSAGE_TYPE_EXCEPTION) => {
            let kind = frame.exception_type().unwrap_or("UnknownException");
            let message = serde_json::from_slice::<UpstreamException>(frame.payload())
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| String::from_utf8_lossy(frame.payload()).into_owned());
            Err(RelayError::UpstreamException(format!("{kind}: {message}")))
        }
        _ => Ok(FrameDisposition::Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_stream() -> (TranscribeStream, mpsc::Receiver<Bytes>) {
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        (
            TranscribeStream {
                audio_tx: Some(audio_tx),
                shutdown_tx: None,
                connection_handle: None,
                is_connected: Arc::new(AtomicBool::new(false)),
            },
            audio_rx,
        )
    }

    #[tokio::test]
    async fn test_audio_dropped_while_not_connected() {
        let (stream, mut audio_rx) = disconnected_stream();

        for _ in 0..3 {
            let chunk = Bytes::from(vec![0u8; 640]);
            stream.send_audio(chunk).await.unwrap();
        }

        // Nothing was queued toward the (absent) connection task.
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_audio_queued_while_connected() {
        let (mut stream, mut audio_rx) = disconnected_stream();
        stream.is_connected.store(true, Ordering::Release);

        stream.send_audio(Bytes::from(vec![1u8; 320])).await.unwrap();
        assert_eq!(audio_rx.try_recv().unwrap().len(), 320);

        stream.finish();
        assert!(!stream.is_ready());
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let (stream, _audio_rx) = disconnected_stream();
        let chunk = Bytes::from(vec![0u8; MAX_AUDIO_CHUNK_SIZE + 1]);
        assert!(matches!(
            stream.send_audio(chunk).await,
            Err(RelayError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_drain_bounded_against_chatty_upstream() {
        use crate::core::eventstream::{HEADER_MESSAGE_TYPE, HeaderValue};

        let wire = Bytes::from(eventstream::encode(&Frame::new(
            vec![(
                HEADER_MESSAGE_TYPE.to_string(),
                HeaderValue::String(MESSAGE_TYPE_EVENT.to_string()),
            )],
            Bytes::from_static(
                br#"{"Transcript":{"Results":[{"Alternatives":[{"Transcript":"closing words"}]}]}}"#,
            ),
        )));

        // An upstream that never stops talking: one transcript frame every
        // 100ms, forever.
        let mut source = Box::pin(futures::stream::unfold(wire, |wire| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((Ok(Message::Binary(wire.clone())), wire))
        }));

        let (event_tx, mut event_rx) = mpsc::channel(256);
        let started = Instant::now();
        drain_upstream(&mut source, &event_tx).await;

        // The drain returned once the window elapsed even though frames
        // kept coming, forwarding the ones that fit.
        assert!(started.elapsed() >= FLUSH_TIMEOUT);
        let mut drained = 0;
        while let Ok(UpstreamEvent::Transcript(text)) = event_rx.try_recv() {
            assert_eq!(text, "closing words");
            drained += 1;
        }
        assert!(drained >= 1);
    }
}
