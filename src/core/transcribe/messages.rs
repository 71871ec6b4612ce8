//! Payload types for Transcribe streaming event frames.
//!
//! Transcript events arrive as JSON inside `:message-type=event` frames.
//! The service nests results as `Transcript.Results[].Alternatives[]`, with
//! alternatives ordered by confidence. Exception frames carry a flat
//! `Message` payload instead.

use serde::{Deserialize, Serialize};

/// Top-level payload of a transcript event frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    #[serde(rename = "Transcript")]
    pub transcript: Option<Transcript>,
}

/// Container for transcription result segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(rename = "Results")]
    pub results: Option<Vec<TranscribeResult>>,
}

/// One transcription segment.
///
/// Segments are partial (interim) until the service finalizes them; the
/// relay forwards both so the client can render live captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResult {
    #[serde(rename = "ResultId")]
    pub result_id: Option<String>,

    #[serde(rename = "StartTime")]
    pub start_time: Option<f64>,

    #[serde(rename = "EndTime")]
    pub end_time: Option<f64>,

    /// `true` while the segment may still change in later responses.
    #[serde(rename = "IsPartial")]
    pub is_partial: Option<bool>,

    /// Alternative transcriptions, ordered by confidence.
    #[serde(rename = "Alternatives")]
    pub alternatives: Option<Vec<Alternative>>,
}

/// One alternative transcription of a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(rename = "Transcript")]
    pub transcript: Option<String>,
}

/// Payload of a `:message-type=exception` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamException {
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

impl TranscribeResult {
    /// Transcript text of the highest-confidence alternative.
    pub fn best_transcript(&self) -> Option<&str> {
        self.alternatives
            .as_ref()
            .and_then(|alts| alts.first())
            .and_then(|alt| alt.transcript.as_deref())
    }
}

impl TranscriptEvent {
    pub fn results(&self) -> Option<&[TranscribeResult]> {
        self.transcript.as_ref().and_then(|t| t.results.as_deref())
    }

    /// Transcript text of the first result's best alternative.
    ///
    /// Returns `None` when the event carries no results, which the service
    /// sends periodically as a keep-alive.
    pub fn best_transcript(&self) -> Option<&str> {
        self.results()
            .and_then(|results| results.first())
            .and_then(|r| r.best_transcript())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_transcript_from_nested_results() {
        let json = r#"{"Transcript":{"Results":[{"ResultId":"r1","IsPartial":true,"Alternatives":[{"Transcript":"hello"},{"Transcript":"hallow"}]}]}}"#;
        let event: TranscriptEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.best_transcript(), Some("hello"));
    }

    #[test]
    fn test_empty_results_yields_none() {
        let json = r#"{"Transcript":{"Results":[]}}"#;
        let event: TranscriptEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.best_transcript(), None);
    }

    #[test]
    fn test_missing_transcript_yields_none() {
        let event: TranscriptEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(event.best_transcript(), None);
        assert!(event.results().is_none());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        // The service includes timing and item metadata the relay ignores.
        let json = r#"{"Transcript":{"Results":[{"ResultId":"r","StartTime":0.0,"EndTime":1.2,"IsPartial":false,"Alternatives":[{"Transcript":"ok","Items":[{"Content":"ok"}]}],"ChannelId":"ch-0"}]}}"#;
        let event: TranscriptEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.best_transcript(), Some("ok"));
        assert_eq!(event.results().unwrap()[0].is_partial, Some(false));
    }

    #[test]
    fn test_exception_payload() {
        let json = r#"{"Message":"The security token included in the request is invalid."}"#;
        let exception: UpstreamException = serde_json::from_str(json).unwrap();
        assert!(exception.message.unwrap().contains("security token"));
    }
}
