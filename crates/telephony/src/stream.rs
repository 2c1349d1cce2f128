//! Bidirectional voice-stream protocol
//!
//! JSON envelopes over the gateway websocket, all keyed by `stream_sid`:
//! `start`, `media` (base64 PCM16 / 8 kHz / mono LE), `stop`, and `mark`
//! (server-sent, echoed when playback completes).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::TelephonyError;

/// Media frame body; `track` and `chunk` may be omitted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u64>,
    pub timestamp: u64,
    /// base64-encoded PCM16 / 8 kHz / mono / little-endian
    pub payload: String,
}

impl MediaPayload {
    pub fn decode_audio(&self) -> Result<Vec<u8>, TelephonyError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| TelephonyError::Protocol(format!("bad media payload: {}", e)))
    }
}

/// Stream protocol events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        stream_sid: String,
        #[serde(rename = "callSid", skip_serializing_if = "Option::is_none")]
        call_sid: Option<String>,
    },
    Media {
        stream_sid: String,
        media: MediaPayload,
    },
    Stop {
        stream_sid: String,
    },
    Mark {
        stream_sid: String,
        mark: MarkBody,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkBody {
    pub name: String,
}

impl StreamEvent {
    pub fn parse(text: &str) -> Result<Self, TelephonyError> {
        serde_json::from_str(text)
            .map_err(|e| TelephonyError::Protocol(format!("bad stream event: {}", e)))
    }

    pub fn stream_sid(&self) -> &str {
        match self {
            StreamEvent::Start { stream_sid, .. } => stream_sid,
            StreamEvent::Media { stream_sid, .. } => stream_sid,
            StreamEvent::Stop { stream_sid } => stream_sid,
            StreamEvent::Mark { stream_sid, .. } => stream_sid,
        }
    }

    /// Build an outbound media frame from raw PCM16 bytes
    pub fn outbound_media(stream_sid: &str, sequence: u64, timestamp: u64, pcm: &[u8]) -> Self {
        StreamEvent::Media {
            stream_sid: stream_sid.to_string(),
            media: MediaPayload {
                track: Some("outbound".to_string()),
                chunk: Some(sequence),
                timestamp,
                payload: BASE64.encode(pcm),
            },
        }
    }

    /// Build a mark frame asking the gateway to echo on playback completion
    pub fn mark(stream_sid: &str, name: &str) -> Self {
        StreamEvent::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkBody {
                name: name.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_event() {
        let raw = r#"{
            "event": "media",
            "stream_sid": "MZ123",
            "media": {
                "timestamp": 1000,
                "payload": "AAAA"
            }
        }"#;

        let event = StreamEvent::parse(raw).unwrap();
        assert_eq!(event.stream_sid(), "MZ123");
        match event {
            StreamEvent::Media { media, .. } => {
                assert!(media.track.is_none());
                assert_eq!(media.decode_audio().unwrap(), vec![0, 0, 0]);
            },
            _ => panic!("expected media"),
        }
    }

    #[test]
    fn test_parse_start_stop() {
        let start = StreamEvent::parse(
            r#"{"event": "start", "stream_sid": "MZ1", "callSid": "ext-9"}"#,
        )
        .unwrap();
        match start {
            StreamEvent::Start { call_sid, .. } => assert_eq!(call_sid.as_deref(), Some("ext-9")),
            _ => panic!("expected start"),
        }

        let stop = StreamEvent::parse(r#"{"event": "stop", "stream_sid": "MZ1"}"#).unwrap();
        assert!(matches!(stop, StreamEvent::Stop { .. }));
    }

    #[test]
    fn test_outbound_media_round_trip() {
        let pcm = vec![1u8, 2, 3, 4];
        let event = StreamEvent::outbound_media("MZ9", 7, 700, &pcm);
        let parsed = StreamEvent::parse(&event.to_json()).unwrap();
        match parsed {
            StreamEvent::Media { media, .. } => {
                assert_eq!(media.chunk, Some(7));
                assert_eq!(media.decode_audio().unwrap(), pcm);
            },
            _ => panic!("expected media"),
        }
    }

    #[test]
    fn test_bad_event_rejected() {
        assert!(StreamEvent::parse("{\"event\": \"unknown\"}").is_err());
        assert!(StreamEvent::parse("not json").is_err());
    }
}
