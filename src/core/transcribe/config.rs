//! Configuration for the Transcribe streaming upstream connection.

use crate::config::RelayConfig;
use crate::core::signer::{Credentials, PresignRequest};
use crate::errors::RelayError;

/// Canonical path of the streaming WebSocket endpoint.
pub const TRANSCRIBE_WS_PATH: &str = "/stream-transcription-websocket";

/// Signing service name for credential scope derivation.
const SERVICE: &str = "transcribe";

/// Minimum supported sample rate (8kHz for telephony)
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Maximum supported sample rate (48kHz for high-quality audio)
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// Recommended default sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default media encoding query value.
pub const DEFAULT_MEDIA_ENCODING: &str = "pcm";

/// Default presigned URL validity window.
pub const DEFAULT_EXPIRES_SECS: u32 = 300;

/// Upstream connection parameters for one relay session.
///
/// Derived from the process-wide [`RelayConfig`] when a downstream client
/// connects; immutable for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct TranscribeConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    /// Endpoint host including port (derived from region unless overridden).
    pub endpoint_host: String,
    pub language_code: String,
    pub media_encoding: String,
    pub sample_rate: u32,
    pub expires_secs: u32,
}

impl TranscribeConfig {
    /// Build from the validated process configuration.
    pub fn from_relay(config: &RelayConfig) -> Self {
        let endpoint_host = config
            .transcribe_endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint_host(&config.aws_region));

        Self {
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            region: config.aws_region.clone(),
            endpoint_host,
            language_code: config.language_code.clone(),
            media_encoding: config.media_encoding.clone(),
            sample_rate: config.sample_rate,
            expires_secs: config.presign_expires_secs,
        }
    }

    /// Validate fields that would otherwise fail deep inside a session.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(RelayError::Config(
                "AWS credentials are required for the Transcribe upstream".to_string(),
            ));
        }
        if self.region.is_empty() {
            return Err(RelayError::Config("AWS region must not be empty".to_string()));
        }
        if self.endpoint_host.is_empty() {
            return Err(RelayError::Config(
                "Transcribe endpoint host must not be empty".to_string(),
            ));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(RelayError::Config(format!(
                "Sample rate must be between {} and {} Hz, got {}",
                MIN_SAMPLE_RATE, MAX_SAMPLE_RATE, self.sample_rate
            )));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            region: self.region.clone(),
            service: SERVICE.to_string(),
        }
    }

    pub fn presign_request(&self) -> PresignRequest {
        PresignRequest {
            host: self.endpoint_host.clone(),
            path: TRANSCRIBE_WS_PATH.to_string(),
            language_code: self.language_code.clone(),
            media_encoding: self.media_encoding.clone(),
            sample_rate: self.sample_rate,
            expires_secs: self.expires_secs,
        }
    }
}

/// Regional streaming endpoint. The WebSocket API listens on 8443.
fn default_endpoint_host(region: &str) -> String {
    format!("transcribestreaming.{region}.amazonaws.com:8443")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TranscribeConfig {
        TranscribeConfig {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            region: "us-east-1".to_string(),
            endpoint_host: default_endpoint_host("us-east-1"),
            language_code: "en-US".to_string(),
            media_encoding: DEFAULT_MEDIA_ENCODING.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            expires_secs: DEFAULT_EXPIRES_SECS,
        }
    }

    #[test]
    fn test_default_endpoint_host() {
        assert_eq!(
            default_endpoint_host("eu-west-1"),
            "transcribestreaming.eu-west-1.amazonaws.com:8443"
        );
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut config = test_config();
        config.access_key_id.clear();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_sample_rate_out_of_range_rejected() {
        let mut config = test_config();
        config.sample_rate = 4000;
        let result = config.validate();
        assert!(matches!(result, Err(RelayError::Config(_))));
        if let Err(RelayError::Config(msg)) = result {
            assert!(msg.contains("Sample rate"));
        }
    }

    #[test]
    fn test_presign_request_carries_media_params() {
        let request = test_config().presign_request();
        assert_eq!(request.path, TRANSCRIBE_WS_PATH);
        assert_eq!(request.language_code, "en-US");
        assert_eq!(request.media_encoding, "pcm");
        assert_eq!(request.sample_rate, 16000);
    }
}
