//! SigV4 query-string presigning for the Transcribe streaming WebSocket.
//!
//! Derives a time-limited `wss://` URL carrying the signature in its query
//! parameters, so the WebSocket handshake needs no `Authorization` header.
//! The derivation is a fixed external protocol: canonical request, string to
//! sign, then a four-key HMAC chain (date -> region -> service -> signing
//! key). Everything here is pure computation over immutable inputs; the
//! timestamp is captured once per call and used for every derived value, so
//! no stale date can leak between signing operations.

use std::collections::BTreeMap;
use std::time::SystemTime;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm identifier for all derived values.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Terminal credential-scope component.
const AWS4_REQUEST: &str = "aws4_request";

/// Compact ISO8601 request date-time, millisecond-stripped (e.g. `20260823T141503Z`).
const AMZ_DATE_TIME: &[BorrowedFormatItem<'_>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Errors produced while deriving a presigned URL.
///
/// These are configuration-class failures: they surface at startup, before
/// any connection attempt, and are never retried.
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("missing credential field: {0}")]
    MissingCredential(&'static str),

    #[error("endpoint host must not be empty")]
    EmptyHost,

    #[error("timestamp formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

/// Immutable signing credentials, shared read-only across sessions.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub service: String,
}

impl Credentials {
    fn validate(&self) -> Result<(), SignerError> {
        if self.access_key_id.is_empty() {
            return Err(SignerError::MissingCredential("access key id"));
        }
        if self.secret_access_key.is_empty() {
            return Err(SignerError::MissingCredential("secret access key"));
        }
        if self.region.is_empty() {
            return Err(SignerError::MissingCredential("region"));
        }
        if self.service.is_empty() {
            return Err(SignerError::MissingCredential("service"));
        }
        Ok(())
    }
}

/// One presigning request. Used once and discarded after URL construction.
#[derive(Debug, Clone)]
pub struct PresignRequest {
    /// Endpoint host, including port if non-default (e.g.
    /// `transcribestreaming.us-east-1.amazonaws.com:8443`).
    pub host: String,
    /// Canonical request path (e.g. `/stream-transcription-websocket`).
    pub path: String,
    /// Transcription language (e.g. `en-US`).
    pub language_code: String,
    /// Audio container format (e.g. `pcm`).
    pub media_encoding: String,
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
    /// Signature validity window in seconds.
    pub expires_secs: u32,
}

/// Build the presigned `wss://` connection URL.
///
/// Deterministic: the same credentials, request, and timestamp always yield a
/// byte-identical URL. The signature parameter is appended last and is not
/// itself part of the canonical query string it signs.
pub fn build_presigned_url(
    credentials: &Credentials,
    request: &PresignRequest,
    now: SystemTime,
) -> Result<String, SignerError> {
    credentials.validate()?;
    if request.host.is_empty() {
        return Err(SignerError::EmptyHost);
    }

    let date_time = OffsetDateTime::from(now)
        .to_offset(time::UtcOffset::UTC)
        .format(&AMZ_DATE_TIME)?;
    let date = &date_time[..8];

    // The Host header is a signature input only; it is never transmitted as
    // an HTTP header on the WebSocket handshake.
    let headers = BTreeMap::from([("host".to_string(), request.host.clone())]);
    let signed_headers = signed_header_list(&headers);

    let mut query = BTreeMap::new();
    query.insert("language-code".to_string(), request.language_code.clone());
    query.insert("media-encoding".to_string(), request.media_encoding.clone());
    query.insert("sample-rate".to_string(), request.sample_rate.to_string());
    query.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
    query.insert(
        "X-Amz-Credential".to_string(),
        format!(
            "{}/{}",
            credentials.access_key_id,
            credential_scope(date, &credentials.region, &credentials.service)
        ),
    );
    query.insert("X-Amz-Date".to_string(), date_time.clone());
    query.insert("X-Amz-Expires".to_string(), request.expires_secs.to_string());
    query.insert("X-Amz-SignedHeaders".to_string(), signed_headers.clone());

    let canonical_query = canonical_query_string(&query);
    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        request.path,
        canonical_query,
        canonical_headers(&headers),
        signed_headers,
        sha256_hex(b""),
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        date_time,
        credential_scope(date, &credentials.region, &credentials.service),
        sha256_hex(canonical_request.as_bytes()),
    );

    let signing_key = derive_signing_key(
        &credentials.secret_access_key,
        date,
        &credentials.region,
        &credentials.service,
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    // Signature appended after canonicalization, never part of its own input.
    Ok(format!(
        "wss://{}{}?{}&X-Amz-Signature={}",
        request.host, request.path, canonical_query, signature
    ))
}

/// Four-key HMAC derivation chain. Computed fresh per signing operation; the
/// date key depends on the captured timestamp so it is never cached.
fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, service.as_bytes());
    hmac_sha256(&service_key, AWS4_REQUEST.as_bytes())
}

fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{date}/{region}/{service}/{AWS4_REQUEST}")
}

/// Percent-encoded query string, keys sorted by raw bytes (BTreeMap order).
fn canonical_query_string(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical header block: lower-cased, trimmed, sorted, newline-terminated.
fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name.to_lowercase(), value.trim()))
        .collect()
}

/// Semicolon-joined sorted lower-cased header names. Must exactly match the
/// name set used for the canonical header block.
fn signed_header_list(headers: &BTreeMap<String, String>) -> String {
    headers
        .keys()
        .map(|name| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

/// Percent-encode leaving only unreserved characters bare.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length, so new_from_slice cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
