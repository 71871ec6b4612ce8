//! Binary event-stream frame codec for the Transcribe streaming protocol.
//!
//! Frames are self-describing: a fixed prelude of two big-endian u32 length
//! fields plus a CRC32 over those fields, a typed header block, the raw
//! payload, and a trailing CRC32 over everything before it. Outbound audio is
//! wrapped in `AudioEvent` frames; inbound frames carry the transcript JSON.
//!
//! Header values are a tagged variant type rather than a dynamic map so that
//! type-tag mismatches are caught here at decode time instead of surfacing
//! later as JSON parse failures.

use bytes::Bytes;
use thiserror::Error;

/// Header name carrying the frame's message classification.
pub const HEADER_MESSAGE_TYPE: &str = ":message-type";

/// Header name carrying the event classification for `event` frames.
pub const HEADER_EVENT_TYPE: &str = ":event-type";

/// Header name carrying the exception classification for `exception` frames.
pub const HEADER_EXCEPTION_TYPE: &str = ":exception-type";

/// `:message-type` value for normal event frames.
pub const MESSAGE_TYPE_EVENT: &str = "event";

/// `:message-type` value for upstream error frames.
pub const MESSAGE_TYPE_EXCEPTION: &str = "exception";

/// `:event-type` value for outbound audio frames.
pub const EVENT_TYPE_AUDIO: &str = "AudioEvent";

/// Wire type tag for byte-array header values.
const TYPE_BYTE_ARRAY: u8 = 6;

/// Wire type tag for string header values.
const TYPE_STRING: u8 = 7;

/// Prelude bytes: total length (4) + headers length (4) + prelude CRC (4).
const PRELUDE_LEN: usize = 12;

/// Fixed overhead: prelude plus trailing message CRC.
const OVERHEAD_LEN: usize = PRELUDE_LEN + 4;

/// Decode failures. Any of these means framing alignment can no longer be
/// trusted for the rest of the stream.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: declared {declared} bytes, {available} available")]
    Truncated { declared: usize, available: usize },

    #[error("declared lengths are inconsistent (total {total}, headers {headers})")]
    InvalidLength { total: usize, headers: usize },

    #[error("prelude checksum mismatch")]
    PreludeChecksum,

    #[error("message checksum mismatch")]
    MessageChecksum,

    #[error("header block overruns its declared length")]
    HeaderOverrun,

    #[error("unsupported header value type tag {0}")]
    UnsupportedHeaderType(u8),

    #[error("header name or value is not valid UTF-8")]
    InvalidHeaderText,
}

/// Typed header value. The protocol only produces strings and byte arrays;
/// any other wire tag is treated as corruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    String(String),
    ByteArray(Vec<u8>),
}

impl HeaderValue {
    /// String contents, if this is a string-typed header.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            HeaderValue::ByteArray(_) => None,
        }
    }
}

/// A decoded event-stream frame: ordered headers plus an opaque payload.
///
/// Unknown header names are preserved as-is; decode only rejects frames that
/// are structurally invalid, never ones that are semantically unexpected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    headers: Vec<(String, HeaderValue)>,
    payload: Bytes,
}

impl Frame {
    pub fn new(headers: Vec<(String, HeaderValue)>, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// Build an outbound `AudioEvent` frame wrapping PCM payload bytes.
    pub fn audio_event(payload: Bytes) -> Self {
        Self {
            headers: vec![
                (
                    HEADER_MESSAGE_TYPE.to_string(),
                    HeaderValue::String(MESSAGE_TYPE_EVENT.to_string()),
                ),
                (
                    HEADER_EVENT_TYPE.to_string(),
                    HeaderValue::String(EVENT_TYPE_AUDIO.to_string()),
                ),
            ],
            payload,
        }
    }

    /// First header value with the given name.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The `:message-type` header, when present and string-typed.
    pub fn message_type(&self) -> Option<&str> {
        self.header(HEADER_MESSAGE_TYPE).and_then(HeaderValue::as_str)
    }

    /// The `:exception-type` header, when present and string-typed.
    pub fn exception_type(&self) -> Option<&str> {
        self.header(HEADER_EXCEPTION_TYPE).and_then(HeaderValue::as_str)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Encode a frame into its wire representation.
///
/// Inverse of [`decode`] for any frame with ASCII header names and values.
/// Header names are limited to 255 bytes and values to 64 KiB by the wire
/// format itself; the frames this crate produces are far below both.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut header_block = Vec::new();
    for (name, value) in &frame.headers {
        debug_assert!(name.len() <= u8::MAX as usize);
        header_block.push(name.len() as u8);
        header_block.extend_from_slice(name.as_bytes());
        match value {
            HeaderValue::String(s) => {
                debug_assert!(s.len() <= u16::MAX as usize);
                header_block.push(TYPE_STRING);
                header_block.extend_from_slice(&(s.len() as u16).to_be_bytes());
                header_block.extend_from_slice(s.as_bytes());
            }
            HeaderValue::ByteArray(b) => {
                debug_assert!(b.len() <= u16::MAX as usize);
                header_block.push(TYPE_BYTE_ARRAY);
                header_block.extend_from_slice(&(b.len() as u16).to_be_bytes());
                header_block.extend_from_slice(b);
            }
        }
    }

    let total_len = OVERHEAD_LEN + header_block.len() + frame.payload.len();
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&(header_block.len() as u32).to_be_bytes());
    out.extend_from_slice(&crc32fast::hash(&out[..8]).to_be_bytes());
    out.extend_from_slice(&header_block);
    out.extend_from_slice(&frame.payload);
    out.extend_from_slice(&crc32fast::hash(&out).to_be_bytes());
    out
}

/// Decode a wire buffer into a frame, validating both checksums and all
/// declared lengths against the bytes actually available.
pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
    if buf.len() < OVERHEAD_LEN {
        return Err(FrameError::Truncated {
            declared: OVERHEAD_LEN,
            available: buf.len(),
        });
    }

    let total_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    let headers_len = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    let prelude_crc = u32::from_be_bytes(buf[8..12].try_into().unwrap());

    if crc32fast::hash(&buf[..8]) != prelude_crc {
        return Err(FrameError::PreludeChecksum);
    }
    if total_len > buf.len() {
        return Err(FrameError::Truncated {
            declared: total_len,
            available: buf.len(),
        });
    }
    if total_len < OVERHEAD_LEN || headers_len > total_len - OVERHEAD_LEN {
        return Err(FrameError::InvalidLength {
            total: total_len,
            headers: headers_len,
        });
    }

    let message_crc = u32::from_be_bytes(buf[total_len - 4..total_len].try_into().unwrap());
    if crc32fast::hash(&buf[..total_len - 4]) != message_crc {
        return Err(FrameError::MessageChecksum);
    }

    let headers = decode_headers(&buf[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
    let payload = Bytes::copy_from_slice(&buf[PRELUDE_LEN + headers_len..total_len - 4]);

    Ok(Frame { headers, payload })
}

fn decode_headers(mut block: &[u8]) -> Result<Vec<(String, HeaderValue)>, FrameError> {
    let mut headers = Vec::new();
    while !block.is_empty() {
        let name_len = block[0] as usize;
        block = &block[1..];
        if block.len() < name_len + 1 {
            return Err(FrameError::HeaderOverrun);
        }
        let name = std::str::from_utf8(&block[..name_len])
            .map_err(|_| FrameError::InvalidHeaderText)?
            .to_string();
        let type_tag = block[name_len];
        block = &block[name_len + 1..];

        let value = match type_tag {
            TYPE_STRING | TYPE_BYTE_ARRAY => {
                if block.len() < 2 {
                    return Err(FrameError::HeaderOverrun);
                }
                let value_len = u16::from_be_bytes(block[..2].try_into().unwrap()) as usize;
                block = &block[2..];
                if block.len() < value_len {
                    return Err(FrameError::HeaderOverrun);
                }
                let raw = &block[..value_len];
                block = &block[value_len..];
                if type_tag == TYPE_STRING {
                    HeaderValue::String(
                        std::str::from_utf8(raw)
                            .map_err(|_| FrameError::InvalidHeaderText)?
                            .to_string(),
                    )
                } else {
                    HeaderValue::ByteArray(raw.to_vec())
                }
            }
            other => return Err(FrameError::UnsupportedHeaderType(other)),
        };

        headers.push((name, value));
    }
    Ok(headers)
}
