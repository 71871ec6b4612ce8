//! Server configuration.
//!
//! Configuration is environment-first: every knob has an `RELAY_`-free env
//! var name, `.env` files are honored via `dotenvy` in `main`, and a couple
//! of flags can be overridden on the command line. `from_env` never fails on
//! a missing optional value; `validate` catches the combinations that cannot
//! work before the server binds.

use std::env;

use crate::errors::{RelayError, RelayResult};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LANGUAGE_CODE: &str = "en-US";
const DEFAULT_MEDIA_ENCODING: &str = "pcm";
const DEFAULT_SAMPLE_RATE: u32 = 16000;
const DEFAULT_PRESIGN_EXPIRES_SECS: u32 = 300;

/// Process-wide relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind host for the downstream WebSocket server.
    pub host: String,

    /// Bind port for the downstream WebSocket server.
    pub port: u16,

    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,

    /// Override for the Transcribe endpoint host (with port). Defaults to
    /// the regional endpoint when unset; mostly useful against a local stub.
    pub transcribe_endpoint: Option<String>,

    /// BCP-47 language code passed through to Transcribe.
    pub language_code: String,

    /// Media encoding query value, `pcm` unless Transcribe grows more.
    pub media_encoding: String,

    /// Sample rate of the audio the client captures, in Hz.
    pub sample_rate: u32,

    /// Validity window of each presigned URL.
    pub presign_expires_secs: u32,

    /// Comma-separated allowed CORS origins, or `*`. Unset means
    /// same-origin only.
    pub cors_allowed_origins: Option<String>,
}

impl RelayConfig {
    /// Load configuration from environment variables, applying defaults for
    /// everything but the AWS credentials.
    pub fn from_env() -> RelayResult<Self> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| RelayError::Config(format!("Invalid PORT value: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let sample_rate = match env::var("TRANSCRIBE_SAMPLE_RATE") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                RelayError::Config(format!("Invalid TRANSCRIBE_SAMPLE_RATE value: {raw}"))
            })?,
            Err(_) => DEFAULT_SAMPLE_RATE,
        };

        let presign_expires_secs = match env::var("PRESIGN_EXPIRES_SECS") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                RelayError::Config(format!("Invalid PRESIGN_EXPIRES_SECS value: {raw}"))
            })?,
            Err(_) => DEFAULT_PRESIGN_EXPIRES_SECS,
        };

        Ok(Self {
            host: env_or("HOST", DEFAULT_HOST),
            port,
            aws_access_key_id: env_or("AWS_ACCESS_KEY_ID", ""),
            aws_secret_access_key: env_or("AWS_SECRET_ACCESS_KEY", ""),
            aws_region: env_or("AWS_REGION", "us-east-1"),
            transcribe_endpoint: env::var("TRANSCRIBE_ENDPOINT").ok(),
            language_code: env_or("TRANSCRIBE_LANGUAGE_CODE", DEFAULT_LANGUAGE_CODE),
            media_encoding: env_or("TRANSCRIBE_MEDIA_ENCODING", DEFAULT_MEDIA_ENCODING),
            sample_rate,
            presign_expires_secs,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
        })
    }

    /// Reject configurations that cannot serve a single session.
    pub fn validate(&self) -> RelayResult<()> {
        if self.host.is_empty() {
            return Err(RelayError::Config("HOST must not be empty".to_string()));
        }
        if self.aws_access_key_id.is_empty() {
            return Err(RelayError::Config(
                "AWS_ACCESS_KEY_ID is required".to_string(),
            ));
        }
        if self.aws_secret_access_key.is_empty() {
            return Err(RelayError::Config(
                "AWS_SECRET_ACCESS_KEY is required".to_string(),
            ));
        }
        if self.aws_region.is_empty() {
            return Err(RelayError::Config("AWS_REGION must not be empty".to_string()));
        }
        if self.language_code.is_empty() {
            return Err(RelayError::Config(
                "TRANSCRIBE_LANGUAGE_CODE must not be empty".to_string(),
            ));
        }
        if self.presign_expires_secs == 0 {
            return Err(RelayError::Config(
                "PRESIGN_EXPIRES_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bind address string for the listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RelayConfig {
        RelayConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            aws_access_key_id: "AKIDEXAMPLE".to_string(),
            aws_secret_access_key: "secret".to_string(),
            aws_region: "us-east-1".to_string(),
            transcribe_endpoint: None,
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            media_encoding: DEFAULT_MEDIA_ENCODING.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            presign_expires_secs: DEFAULT_PRESIGN_EXPIRES_SECS,
            cors_allowed_origins: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_access_key_rejected() {
        let mut config = test_config();
        config.aws_access_key_id.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("AWS_ACCESS_KEY_ID"));
    }

    #[test]
    fn test_missing_secret_key_rejected() {
        let mut config = test_config();
        config.aws_secret_access_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let mut config = test_config();
        config.presign_expires_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_address_format() {
        let config = test_config();
        assert_eq!(config.address(), "127.0.0.1:8080");
    }
}
