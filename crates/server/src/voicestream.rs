//! Bidirectional voice stream
//!
//! The gateway first fetches the call-flow response, then opens a
//! websocket to `/voice/:session_id`. Inbound frames are JSON envelopes
//! (start/media/stop/mark); outbound media is framed by the session's
//! rechunker and serialized here with the negotiated `stream_sid`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

use outdial_core::Language;
use outdial_pipeline::stt::batch::BatchSttConfig;
use outdial_pipeline::stt::SttSessionConfig;
use outdial_pipeline::tts::http::{HttpTtsClient, TtsProviderConfig};
use outdial_session::{
    InboundEvent, SessionDeps, SessionHandle, SessionOutput, VoiceSession, VoiceSessionConfig,
};
use outdial_telephony::StreamEvent;

use crate::state::AppState;
use crate::ApiError;

/// Call-flow response directing the gateway to the audio stream
pub async fn call_flow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The session must exist before the gateway connects audio
    state
        .persistence
        .calls
        .get(&session_id)
        .await?
        .ok_or_else(|| {
            ApiError(outdial_core::Error::NotFound(format!(
                "call {}",
                session_id
            )))
        })?;

    Ok(Json(serde_json::json!({
        "url": state.stream_url(&session_id),
    })))
}

/// Websocket upgrade for the voice stream
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, axum::http::StatusCode> {
    let record = state
        .persistence
        .calls
        .get(&session_id)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(axum::http::StatusCode::NOT_FOUND)?;

    if record.status.is_terminal() {
        return Err(axum::http::StatusCode::GONE);
    }

    let profile = state
        .persistence
        .profiles
        .get_agent(record.agent_id)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(axum::http::StatusCode::NOT_FOUND)?;

    Ok(ws.on_upgrade(move |socket| handle_stream(socket, state, record, profile)))
}

fn session_config(state: &AppState, profile: &outdial_core::AgentProfile) -> VoiceSessionConfig {
    let settings = &state.settings;
    VoiceSessionConfig {
        cooldown: Duration::from_millis(settings.session.cooldown_ms),
        debounce: Duration::from_millis(settings.session.end_of_speech_debounce_ms),
        max_utterance: Duration::from_millis(settings.session.max_utterance_ms),
        silence_window: Duration::from_millis(
            outdial_config::constants::turn::BATCH_SILENCE_WINDOW_MS,
        ),
        stt: SttSessionConfig {
            deepgram_url: settings.stt.deepgram_url.clone(),
            deepgram_api_key: settings.stt.deepgram_api_key.clone(),
            sarvam_url: settings.stt.sarvam_url.clone(),
            sarvam_api_key: settings.stt.sarvam_api_key.clone(),
            language: Language::new(&profile.language),
            detect_language: profile.enable_auto_language_detection,
        },
        batch_stt: BatchSttConfig {
            url: settings.stt.batch_url.clone(),
            api_key: settings.stt.batch_api_key.clone(),
            language: Some(profile.language.clone()),
        },
    }
}

async fn handle_stream(
    socket: WebSocket,
    state: AppState,
    record: outdial_core::CallSession,
    profile: outdial_core::AgentProfile,
) {
    let session_id = record.session_id.clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let tts = HttpTtsClient::new(
        profile.voice.provider,
        TtsProviderConfig {
            openai_api_key: state.settings.tts.openai_api_key.clone(),
            elevenlabs_api_key: state.settings.tts.elevenlabs_api_key.clone(),
            deepgram_api_key: state.settings.tts.deepgram_api_key.clone(),
            sarvam_api_key: state.settings.tts.sarvam_api_key.clone(),
        },
    );

    let deps = SessionDeps {
        calls: state.persistence.calls.clone(),
        coordinator: state.coordinator.clone(),
        slots: state.slots.clone(),
        stt_pool: state.stt_pool.clone(),
        llm: state.llm.clone(),
        tts: std::sync::Arc::new(tts),
        retriever: state.retriever.clone(),
        terminator: state.terminator(),
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(256);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<SessionOutput>(256);

    let config = session_config(&state, &profile);
    let session = VoiceSession::new(record, profile, config, deps, outbound_tx);
    let session_task = tokio::spawn(session.run(inbound_rx));

    state
        .registry
        .insert(&session_id, SessionHandle::new(inbound_tx.clone()));

    // Negotiated on the gateway's start frame
    let mut stream_sid: Option<String> = None;
    let mut outbound_ts_ms: u64 = 0;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let Some(Ok(message)) = incoming else {
                    let _ = inbound_tx.send(InboundEvent::Stopped).await;
                    break;
                };
                match message {
                    Message::Text(text) => {
                        let event = match StreamEvent::parse(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::debug!(session_id = %session_id, "Bad stream event: {}", e);
                                continue;
                            },
                        };
                        match event {
                            StreamEvent::Start { stream_sid: sid, call_sid } => {
                                tracing::info!(
                                    session_id = %session_id,
                                    stream_sid = %sid,
                                    call_sid = ?call_sid,
                                    "Audio stream started"
                                );
                                stream_sid = Some(sid);
                            },
                            StreamEvent::Media { media, .. } => {
                                match media.decode_audio() {
                                    Ok(pcm) => {
                                        // Never block the socket loop on a
                                        // busy session; drop the frame under
                                        // backpressure
                                        match inbound_tx.try_send(InboundEvent::Audio(pcm)) {
                                            Ok(()) => {},
                                            Err(mpsc::error::TrySendError::Full(_)) => {
                                                metrics::counter!("inbound_frames_dropped").increment(1);
                                            },
                                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                                        }
                                    },
                                    Err(e) => {
                                        tracing::debug!(session_id = %session_id, "Bad media payload: {}", e);
                                    },
                                }
                            },
                            StreamEvent::Stop { .. } => {
                                let _ = inbound_tx.send(InboundEvent::Stopped).await;
                                break;
                            },
                            StreamEvent::Mark { mark, .. } => {
                                tracing::debug!(session_id = %session_id, mark = %mark.name, "Playback mark echoed");
                            },
                        }
                    },
                    Message::Close(_) => {
                        let _ = inbound_tx.send(InboundEvent::Stopped).await;
                        break;
                    },
                    _ => {},
                }
            }

            output = outbound_rx.recv() => {
                let Some(output) = output else {
                    break;
                };
                let Some(ref sid) = stream_sid else {
                    // Session produced audio before the start frame; drop it
                    continue;
                };
                match output {
                    SessionOutput::Frame(frame) => {
                        // 16 bytes of PCM per millisecond at 8 kHz / 16-bit
                        outbound_ts_ms += (frame.pcm.len() / 16) as u64;
                        let event = StreamEvent::outbound_media(
                            sid,
                            frame.sequence,
                            outbound_ts_ms,
                            &frame.pcm,
                        );
                        if ws_tx.send(Message::Text(event.to_json())).await.is_err() {
                            let _ = inbound_tx.send(InboundEvent::Stopped).await;
                            break;
                        }
                    },
                    SessionOutput::Mark(name) => {
                        let event = StreamEvent::mark(sid, &name);
                        let _ = ws_tx.send(Message::Text(event.to_json())).await;
                    },
                    SessionOutput::Close { code } => {
                        let _ = ws_tx
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code,
                                reason: "call ended".into(),
                            })))
                            .await;
                        break;
                    },
                }
            }
        }
    }

    state.registry.remove(&session_id);
    // Close the outbound side so in-flight sends fail fast, then let the
    // session finish its terminal cleanup
    drop(outbound_rx);
    if let Err(e) = session_task.await {
        tracing::warn!(session_id = %session_id, "Session task join failed: {}", e);
    }
    tracing::info!(session_id = %session_id, "Audio stream closed");
}
