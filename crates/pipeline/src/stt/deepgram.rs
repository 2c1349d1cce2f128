//! Deepgram-style live streaming STT client
//!
//! Binary PCM frames go up the websocket; JSON result envelopes come back.
//! The connection is opened with interim results, VAD events and
//! endpointing enabled; `utterance_end_ms` drives the provider
//! end-of-speech signal (the session still arms its own debounce, since
//! that signal is unreliable for some models).

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use outdial_core::SttProvider;

use super::{SttEvent, SttHandle, SttSession, SttSessionConfig};
use crate::PipelineError;

#[derive(Deserialize)]
struct ResultsEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Option<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    language_confidence: Option<f32>,
}

#[derive(Deserialize)]
struct Alternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

fn build_url(config: &SttSessionConfig) -> String {
    let mut url = format!(
        "{}?encoding=linear16&sample_rate=8000&channels=1&interim_results=true&vad_events=true&endpointing=300&utterance_end_ms=1000",
        config.deepgram_url
    );
    if config.detect_language {
        url.push_str("&detect_language=true");
    } else {
        url.push_str(&format!("&language={}", config.language.code()));
    }
    url
}

/// Open a live Deepgram stream
pub async fn connect(config: &SttSessionConfig) -> Result<SttSession, PipelineError> {
    let url = build_url(config);
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| PipelineError::Connection(e.to_string()))?;
    request.headers_mut().insert(
        "Authorization",
        format!("Token {}", config.deepgram_api_key)
            .parse()
            .map_err(|_| PipelineError::Connection("bad api key header".to_string()))?,
    );

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| PipelineError::Connection(format!("deepgram connect: {}", e)))?;
    let (mut sink, mut source) = ws.split();

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
    let (close_tx, mut close_rx) = mpsc::channel::<()>(1);
    let (event_tx, event_rx) = mpsc::channel::<SttEvent>(64);

    // Writer: audio up, CloseStream on finish
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(pcm) = audio_rx.recv() => {
                    if sink.send(Message::Binary(pcm)).await.is_err() {
                        break;
                    }
                }
                _ = close_rx.recv() => {
                    let _ = sink
                        .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
                        .await;
                    break;
                }
                else => break,
            }
        }
    });

    // Reader: provider envelopes to session events
    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                _ => continue,
            };

            let envelope: ResultsEnvelope = match serde_json::from_str(&text) {
                Ok(envelope) => envelope,
                Err(_) => continue,
            };

            let event = match envelope.kind.as_str() {
                "Results" => {
                    let Some(channel) = envelope.channel else {
                        continue;
                    };
                    let Some(alt) = channel.alternatives.into_iter().next() else {
                        continue;
                    };
                    if alt.transcript.is_empty() {
                        continue;
                    }
                    let language = channel
                        .detected_language
                        .map(|code| (code, channel.language_confidence.unwrap_or(0.0)));
                    if envelope.is_final {
                        SttEvent::Final {
                            text: alt.transcript,
                            confidence: alt.confidence,
                            language,
                        }
                    } else {
                        SttEvent::Partial {
                            text: alt.transcript,
                        }
                    }
                },
                "UtteranceEnd" => SttEvent::UtteranceEnd,
                "SpeechStarted" => SttEvent::SpeechStarted,
                "Metadata" => continue,
                other => {
                    tracing::debug!(kind = other, "Unhandled STT envelope");
                    continue;
                },
            };

            if event_tx.send(event).await.is_err() {
                break;
            }
        }
        let _ = event_tx.send(SttEvent::Closed).await;
    });

    Ok(SttSession {
        handle: SttHandle::new(audio_tx, close_tx),
        events: event_rx,
        provider: SttProvider::Deepgram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use outdial_core::Language;

    fn config(detect: bool) -> SttSessionConfig {
        SttSessionConfig {
            deepgram_url: "wss://api.deepgram.com/v1/listen".to_string(),
            deepgram_api_key: "key".to_string(),
            sarvam_url: String::new(),
            sarvam_api_key: String::new(),
            language: Language::new("en"),
            detect_language: detect,
        }
    }

    #[test]
    fn test_url_fixed_language() {
        let url = build_url(&config(false));
        assert!(url.contains("language=en"));
        assert!(!url.contains("detect_language"));
        assert!(url.contains("sample_rate=8000"));
        assert!(url.contains("vad_events=true"));
        assert!(url.contains("utterance_end_ms=1000"));
    }

    #[test]
    fn test_url_multilingual_detect() {
        let url = build_url(&config(true));
        assert!(url.contains("detect_language=true"));
        assert!(!url.contains("language=en"));
    }

    #[test]
    fn test_results_envelope_parsing() {
        let envelope: ResultsEnvelope = serde_json::from_str(
            r#"{
                "type": "Results",
                "is_final": true,
                "channel": {
                    "alternatives": [{"transcript": "hello world", "confidence": 0.98}],
                    "detected_language": "en",
                    "language_confidence": 0.95
                }
            }"#,
        )
        .unwrap();
        assert!(envelope.is_final);
        let channel = envelope.channel.unwrap();
        assert_eq!(channel.alternatives[0].transcript, "hello world");
        assert_eq!(channel.detected_language.as_deref(), Some("en"));
    }
}
