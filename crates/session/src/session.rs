//! The per-call voice session task

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::interval;

use outdial_core::audio::rms_energy;
use outdial_core::{
    samples_from_pcm16, AgentProfile, CallSession, CallStatus, CostBreakdown, Language,
    TranscriptEntry,
};
use outdial_coordination::{Coordinator, SlotManager};
use outdial_llm::{ChatBackend, ChatRequest, PromptBuilder, SentenceChunker, TokenChunk, FALLBACK_APOLOGY};
use outdial_persistence::CallSessionStore;
use outdial_pipeline::stt::batch::{self, BatchSttConfig};
use outdial_pipeline::stt::{PooledStt, SttEvent, SttHandle, SttSessionConfig};
use outdial_pipeline::tts::rechunk::OutboundFrame;
use outdial_pipeline::{
    ConnectionPool, Endpointer, FrameRechunker, LanguageTracker, TtsClient, TtsRequest,
    VoicemailDetector,
};
use outdial_rag::{format_context, should_query, Retriever};

use crate::phrases::matches_end_phrase;
use crate::turn::{EarlyLlm, TurnPhase};
use crate::{CallTerminator, SessionError};

/// Voiced-frame energy threshold for the batch-VAD fallback
const BATCH_VAD_ENERGY: f32 = 0.01;

/// Bytes per second of telephony PCM (8 kHz, 16-bit mono)
const PCM_BYTES_PER_SEC: f64 = 16000.0;

/// Events arriving from the gateway stream handler
#[derive(Debug)]
pub enum InboundEvent {
    /// Raw PCM16 audio from a media frame
    Audio(Vec<u8>),
    /// Gateway sent `stop` or the websocket closed
    Stopped,
}

/// Frames and control messages going back to the gateway stream handler
#[derive(Debug)]
pub enum SessionOutput {
    Frame(OutboundFrame),
    Mark(String),
    Close { code: u16 },
}

/// Session timing configuration
#[derive(Debug, Clone)]
pub struct VoiceSessionConfig {
    pub cooldown: Duration,
    pub debounce: Duration,
    pub max_utterance: Duration,
    pub silence_window: Duration,
    pub stt: SttSessionConfig,
    pub batch_stt: BatchSttConfig,
}

/// Shared collaborators handed to each session
#[derive(Clone)]
pub struct SessionDeps {
    pub calls: CallSessionStore,
    pub coordinator: Coordinator,
    pub slots: SlotManager,
    pub stt_pool: Arc<ConnectionPool<PooledStt>>,
    pub llm: Arc<dyn ChatBackend>,
    pub tts: Arc<dyn TtsClient>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub terminator: Arc<dyn CallTerminator>,
}

/// Result of one speaking pipeline run
#[derive(Debug)]
struct SpeakOutcome {
    assistant_text: String,
    llm_tokens: (u64, u64),
    tts_characters: u64,
}

/// Why the session is terminating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    StreamClosed,
    EndPhrase,
    Voicemail,
}

/// Join a turn's final fragments into the user turn text
fn assemble_turn(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One live call's cooperative session task
pub struct VoiceSession {
    record: CallSession,
    profile: AgentProfile,
    config: VoiceSessionConfig,
    deps: SessionDeps,
    outbound_tx: mpsc::Sender<SessionOutput>,

    phase: TurnPhase,
    endpointer: Endpointer,
    tracker: LanguageTracker,
    voicemail: VoicemailDetector,
    rechunker: FrameRechunker,
    prompt: PromptBuilder,
    stt_handle: Option<SttHandle>,

    partial_text: String,
    final_fragments: Vec<String>,
    turn_language: Option<(String, f32)>,
    early: Option<EarlyLlm>,
    turn_audio: Vec<u8>,
    stt_failed: bool,
    cooldown_until: Option<Instant>,
    call_started: Instant,
    cost: CostBreakdown,
    timestamp_ms: u64,
}

impl VoiceSession {
    pub fn new(
        record: CallSession,
        profile: AgentProfile,
        config: VoiceSessionConfig,
        deps: SessionDeps,
        outbound_tx: mpsc::Sender<SessionOutput>,
    ) -> Self {
        let endpointer = Endpointer::new(
            config.debounce,
            config.max_utterance,
            config.silence_window,
        );
        let tracker = LanguageTracker::new(
            Language::new(&profile.language),
            profile.enable_auto_language_detection,
        );
        let voicemail = VoicemailDetector::new(&profile.voicemail_detection);
        let prompt = PromptBuilder::new(&profile.prompt);

        Self {
            record,
            profile,
            config,
            deps,
            outbound_tx,
            phase: TurnPhase::Listening,
            endpointer,
            tracker,
            voicemail,
            rechunker: FrameRechunker::new(),
            prompt,
            stt_handle: None,
            partial_text: String::new(),
            final_fragments: Vec::new(),
            turn_language: None,
            early: None,
            turn_audio: Vec::new(),
            stt_failed: false,
            cooldown_until: None,
            call_started: Instant::now(),
            cost: CostBreakdown::default(),
            timestamp_ms: 0,
        }
    }

    /// Run the session to completion
    pub async fn run(mut self, mut inbound_rx: mpsc::Receiver<InboundEvent>) {
        let session_id = self.record.session_id.clone();
        tracing::info!(session_id = %session_id, "Voice session starting");
        metrics::counter!("voice_sessions_started").increment(1);

        // Live STT through the pooled connection
        let mut stt_events = match self.connect_stt().await {
            Ok(events) => Some(events),
            Err(e) => {
                tracing::warn!(session_id = %session_id, "No live STT, batch fallback: {}", e);
                self.stt_failed = true;
                None
            },
        };

        // Greeting before the first user turn
        let greeting = self.profile.first_message.clone();
        if let Err(e) = self.speak_text(&greeting).await {
            tracing::warn!(session_id = %session_id, "Greeting failed: {}", e);
        }
        self.enter_cooldown();

        let mut ticker = interval(Duration::from_millis(50));
        let reason = loop {
            tokio::select! {
                inbound = inbound_rx.recv() => {
                    match inbound {
                        Some(InboundEvent::Audio(pcm)) => self.on_audio(pcm).await,
                        Some(InboundEvent::Stopped) | None => break EndReason::StreamClosed,
                    }
                }

                event = recv_stt(&mut stt_events) => {
                    match event {
                        Some(event) => {
                            if let Some(reason) = self.on_stt_event(event).await {
                                break reason;
                            }
                        },
                        None => {
                            // Live stream died mid-call; buffered turn audio
                            // continues through the batch path
                            if !self.stt_failed {
                                tracing::warn!(session_id = %session_id, "STT stream lost, batch fallback");
                                self.stt_failed = true;
                            }
                            stt_events = None;
                        },
                    }
                }

                _ = ticker.tick() => {
                    if let Some(reason) = self.on_tick().await {
                        break reason;
                    }
                }
            }
        };

        self.finish(reason).await;
    }

    async fn connect_stt(&mut self) -> Result<mpsc::Receiver<SttEvent>, SessionError> {
        let profile = self.profile.clone();
        let stt_config = self.config.stt.clone();
        let pooled = self
            .deps
            .stt_pool
            .acquire_with(&self.record.session_id, || async move {
                let session = outdial_pipeline::stt::connect(&profile, &stt_config).await?;
                Ok::<_, outdial_pipeline::PipelineError>(PooledStt::new(session))
            })
            .await
            .map_err(|e| SessionError::Setup(e.to_string()))?;

        self.stt_handle = Some(pooled.handle());
        pooled
            .take_events()
            .ok_or_else(|| SessionError::Setup("STT event feed already taken".to_string()))
    }

    /// Inbound caller audio: forward to STT, buffer for batch fallback,
    /// track activity
    async fn on_audio(&mut self, pcm: Vec<u8>) {
        self.cost.stt_seconds += pcm.len() as f64 / PCM_BYTES_PER_SEC;

        // Turn buffer only grows while listening; cooldown audio is echo
        if self.phase == TurnPhase::Listening {
            self.turn_audio.extend_from_slice(&pcm);
        }

        if self.stt_failed {
            // Batch-VAD path: energy decides activity and content
            let samples = samples_from_pcm16(&pcm);
            if rms_energy(&samples) > BATCH_VAD_ENERGY && !self.in_cooldown() {
                let now = Instant::now();
                self.endpointer.on_activity(now);
                self.endpointer.on_final_fragment(now);
            }
            return;
        }

        if let Some(ref handle) = self.stt_handle {
            if handle.send_audio(pcm).await.is_err() {
                self.stt_failed = true;
            }
        }
    }

    /// Live STT events drive the turn state machine
    async fn on_stt_event(&mut self, event: SttEvent) -> Option<EndReason> {
        match event {
            SttEvent::Partial { text } => {
                if self.in_cooldown() || self.phase.is_processing() {
                    return None;
                }
                self.endpointer.on_activity(Instant::now());
                self.partial_text = text;

                // Speculative LLM launch on a long-enough partial
                if EarlyLlm::should_launch(&self.partial_text, self.early.is_some()) {
                    self.launch_early_llm();
                }
                None
            },

            SttEvent::Final {
                text,
                confidence: _,
                language,
            } => {
                // Barge-in rule: drop finals arriving while processing, and
                // anything inside the echo cooldown
                if self.phase.is_processing() || self.in_cooldown() {
                    return None;
                }
                self.endpointer.on_final_fragment(Instant::now());
                if let Some(detection) = language {
                    self.turn_language = Some(detection);
                }
                self.final_fragments.push(text);
                None
            },

            SttEvent::UtteranceEnd => {
                if self.phase.is_processing() || self.in_cooldown() {
                    return None;
                }
                if self.endpointer.on_utterance_end().is_some() {
                    return self.finalize_turn().await;
                }
                None
            },

            SttEvent::SpeechStarted => {
                if !self.in_cooldown() && !self.phase.is_processing() {
                    self.endpointer.on_activity(Instant::now());
                }
                None
            },

            SttEvent::Error(message) => {
                tracing::warn!(session_id = %self.record.session_id, "STT error: {}", message);
                self.stt_failed = true;
                None
            },

            SttEvent::Closed => None,
        }
    }

    /// Timer poll: cooldown expiry and time-based end-of-speech
    async fn on_tick(&mut self) -> Option<EndReason> {
        let now = Instant::now();

        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
                self.phase = TurnPhase::Listening;
            }
            return None;
        }

        if self.phase != TurnPhase::Listening {
            return None;
        }

        let fired = if self.stt_failed {
            self.endpointer.poll_silence(now).is_some()
        } else {
            self.endpointer.poll(now).is_some()
        };

        if fired {
            return self.finalize_turn().await;
        }
        None
    }

    fn launch_early_llm(&mut self) {
        let partial = self.partial_text.clone();
        let llm = Arc::clone(&self.deps.llm);
        let mut builder = self.prompt.clone();
        builder.push_user(partial.clone());
        let request = ChatRequest {
            messages: builder
                .with_language(Some(self.tracker.current().code()))
                .build(),
            model: self.profile.llm.model.clone(),
            temperature: self.profile.llm.temperature,
            max_tokens: self.profile.llm.max_tokens,
        };

        let task = tokio::spawn(async move {
            match llm.generate(&request).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!("Speculative generation failed: {}", e);
                    None
                },
            }
        });

        tracing::debug!(partial = %partial, "Early LLM launched");
        self.early = Some(EarlyLlm { partial, task });
    }

    /// End-of-speech: assemble the turn and run the speaking pipeline
    async fn finalize_turn(&mut self) -> Option<EndReason> {
        self.phase = TurnPhase::Finalizing;

        let user_turn = if self.stt_failed {
            self.batch_transcribe().await.unwrap_or_default()
        } else {
            assemble_turn(&self.final_fragments)
        };

        self.final_fragments.clear();
        self.partial_text.clear();
        self.turn_audio.clear();
        self.endpointer.reset();

        if user_turn.trim().is_empty() {
            self.discard_early();
            self.phase = TurnPhase::Listening;
            return None;
        }

        tracing::debug!(session_id = %self.record.session_id, turn = %user_turn, "User turn");

        // Voicemail short-circuit inside the detection window
        let verdict = self
            .voicemail
            .check(&user_turn, self.call_started, Instant::now());
        if verdict.is_voicemail {
            tracing::info!(
                session_id = %self.record.session_id,
                confidence = verdict.confidence,
                "Voicemail detected"
            );
            metrics::counter!("voicemail_detected").increment(1);
            return Some(EndReason::Voicemail);
        }

        // Language switch bookkeeping
        if let Some((code, confidence)) = self.turn_language.take() {
            if let Some(switch) = self.tracker.observe(&code, confidence) {
                let _ = self
                    .deps
                    .calls
                    .append_language_switch(&self.record.session_id, &switch)
                    .await;
            }
        }

        // Journal the user entry before generating the reply
        let entry = TranscriptEntry::user(
            user_turn.clone(),
            Some(self.tracker.current().code().to_string()),
        );
        if let Err(e) = self
            .deps
            .calls
            .append_transcript(&self.record.session_id, &entry)
            .await
        {
            tracing::warn!(session_id = %self.record.session_id, "Transcript append failed: {}", e);
        }
        self.prompt.push_user(user_turn.clone());

        // End-call phrases settle the call after the goodbye
        if matches_end_phrase(&user_turn, &self.profile.end_call_phrases) {
            self.discard_early();
            let goodbye = self.profile.goodbye_message.clone();
            let _ = self.speak_text(&goodbye).await;
            return Some(EndReason::EndPhrase);
        }

        self.phase = TurnPhase::Speaking;
        let outcome = self.speak_reply(&user_turn).await;

        match outcome {
            Ok(outcome) => {
                self.cost.llm_input_tokens += outcome.llm_tokens.0;
                self.cost.llm_output_tokens += outcome.llm_tokens.1;
                self.cost.tts_characters += outcome.tts_characters;
                self.prompt.push_assistant(outcome.assistant_text);
            },
            Err(e) => {
                tracing::warn!(session_id = %self.record.session_id, "Reply failed: {}", e);
                let apology = FALLBACK_APOLOGY.to_string();
                let _ = self.speak_text(&apology).await;
                self.prompt.push_assistant(apology);
            },
        }

        self.enter_cooldown();
        None
    }

    /// Full reply pipeline: gated retrieval, streamed generation, sentence
    /// chunking, synthesis, framing. Reuses the speculative result when the
    /// final turn matches the partial it was launched with.
    async fn speak_reply(&mut self, user_turn: &str) -> Result<SpeakOutcome, SessionError> {
        // Early-LLM reuse or discard
        if let Some(early) = self.early.take() {
            if !early.materially_differs(user_turn) {
                if let Ok(Some(text)) = early.task.await {
                    tracing::debug!(session_id = %self.record.session_id, "Early LLM result reused");
                    let characters = text.chars().count() as u64;
                    self.say_sentences(vec![text.clone()]).await?;
                    return Ok(SpeakOutcome {
                        assistant_text: text,
                        llm_tokens: (0, 0),
                        tts_characters: characters,
                    });
                }
            } else {
                early.abort();
            }
        }

        // Gated retrieval
        let rag_context = match (&self.deps.retriever, should_query(user_turn)) {
            (Some(retriever), true) => match retriever.embed(user_turn).await {
                Ok(embedding) => match retriever.retrieve(embedding).await {
                    Ok(chunks) => format_context(&chunks),
                    Err(e) => {
                        tracing::debug!("Retrieval failed, answering without context: {}", e);
                        None
                    },
                },
                Err(e) => {
                    tracing::debug!("Embedding failed, answering without context: {}", e);
                    None
                },
            },
            _ => None,
        };

        let request = ChatRequest {
            messages: self
                .prompt
                .clone()
                .with_rag_context(rag_context)
                .with_language(Some(self.tracker.current().code()))
                .build(),
            model: self.profile.llm.model.clone(),
            temperature: self.profile.llm.temperature,
            max_tokens: self.profile.llm.max_tokens,
        };

        let (token_tx, mut token_rx) = mpsc::channel(64);
        let llm = Arc::clone(&self.deps.llm);
        let generator =
            tokio::spawn(async move { llm.generate_streaming(&request, token_tx).await });

        let mut chunker = SentenceChunker::new();
        let mut assistant_text = String::new();
        let mut tts_characters = 0u64;
        let mut usage = (0u64, 0u64);

        while let Some(chunk) = token_rx.recv().await {
            match chunk {
                TokenChunk::Delta(delta) => {
                    assistant_text.push_str(&delta);
                    let sentences = chunker.push(&delta);
                    if !sentences.is_empty() {
                        tts_characters += sentences
                            .iter()
                            .map(|s| s.chars().count() as u64)
                            .sum::<u64>();
                        self.say_sentences(sentences).await?;
                    }
                },
                TokenChunk::Done {
                    input_tokens,
                    output_tokens,
                } => {
                    usage = (input_tokens, output_tokens);
                },
                TokenChunk::Error(e) => {
                    generator.abort();
                    return Err(SessionError::Pipeline(e));
                },
            }
        }

        match generator.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(SessionError::Pipeline(e.to_string())),
            Err(e) => return Err(SessionError::Pipeline(e.to_string())),
        }

        if let Some(tail) = chunker.finish() {
            tts_characters += tail.chars().count() as u64;
            self.say_sentences(vec![tail]).await?;
        }

        Ok(SpeakOutcome {
            assistant_text,
            llm_tokens: usage,
            tts_characters,
        })
    }

    /// Synthesize sentences and frame them to the gateway, journaling each
    /// as an assistant transcript entry
    async fn say_sentences(&mut self, sentences: Vec<String>) -> Result<(), SessionError> {
        for sentence in sentences {
            let request = TtsRequest {
                text: sentence.clone(),
                voice_id: self
                    .profile
                    .voice
                    .voice_for(self.tracker.current())
                    .to_string(),
                language: self.tracker.current().clone(),
                settings: self.profile.voice.settings.clone(),
            };

            let pcm = match self.deps.tts.synthesize(&request).await {
                Ok(pcm) => pcm,
                Err(e) => {
                    // Drop the sentence, keep the turn alive
                    tracing::warn!(session_id = %self.record.session_id, "TTS failed: {}", e);
                    metrics::counter!("tts_sentence_dropped").increment(1);
                    continue;
                },
            };

            let entry = TranscriptEntry::assistant(
                sentence,
                Some(self.tracker.current().code().to_string()),
            );
            let _ = self
                .deps
                .calls
                .append_transcript(&self.record.session_id, &entry)
                .await;

            for frame in self.rechunker.push(&pcm) {
                self.send_frame(frame).await?;
            }
        }
        if let Some(frame) = self.rechunker.flush() {
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), SessionError> {
        // 100ms of audio per full frame
        self.timestamp_ms += (frame.pcm.len() / 320 * 20) as u64;
        self.outbound_tx
            .send(SessionOutput::Frame(frame))
            .await
            .map_err(|_| SessionError::StreamClosed)
    }

    /// Speak a fixed line (greeting, goodbye, apologies) without the LLM
    async fn speak_text(&mut self, text: &str) -> Result<(), SessionError> {
        let previous = self.phase;
        self.phase = TurnPhase::Speaking;
        self.cost.tts_characters += text.chars().count() as u64;
        let result = self.say_sentences(vec![text.to_string()]).await;
        if result.is_ok() {
            let _ = self
                .outbound_tx
                .send(SessionOutput::Mark(format!(
                    "say-{}",
                    self.rechunker.sequence()
                )))
                .await;
        }
        self.phase = previous;
        result
    }

    async fn batch_transcribe(&mut self) -> Option<String> {
        if self.turn_audio.is_empty() {
            return None;
        }
        let audio = std::mem::take(&mut self.turn_audio);
        match batch::transcribe(&self.config.batch_stt, &audio).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(session_id = %self.record.session_id, "Batch STT failed: {}", e);
                None
            },
        }
    }

    fn enter_cooldown(&mut self) {
        self.phase = TurnPhase::Cooldown;
        self.cooldown_until = Some(Instant::now() + self.config.cooldown);
        self.endpointer.reset();
        self.partial_text.clear();
        self.final_fragments.clear();
        self.turn_audio.clear();
    }

    fn in_cooldown(&self) -> bool {
        self.phase == TurnPhase::Cooldown
    }

    fn discard_early(&mut self) {
        if let Some(early) = self.early.take() {
            early.abort();
        }
    }

    /// Terminal cleanup: STT back to the pool, call marked terminal, slot
    /// recovered, transcript handed to the summarizer
    async fn finish(mut self, reason: EndReason) {
        let session_id = self.record.session_id.clone();
        tracing::info!(session_id = %session_id, ?reason, "Voice session ending");

        self.discard_early();
        self.rechunker.clear();

        if let Some(ref handle) = self.stt_handle {
            handle.finish().await;
        }
        self.deps.stt_pool.release(&session_id);

        let _ = self.deps.calls.update_cost(&session_id, &self.cost).await;

        let (status, failure_reason) = match reason {
            EndReason::StreamClosed => (CallStatus::UserEnded, None),
            EndReason::EndPhrase => (CallStatus::AgentEnded, None),
            EndReason::Voicemail => (CallStatus::Completed, Some("voicemail")),
        };
        self.deps
            .terminator
            .mark_ended(&session_id, status, failure_reason)
            .await;

        if !matches!(reason, EndReason::StreamClosed) {
            let _ = self
                .outbound_tx
                .send(SessionOutput::Close { code: 1000 })
                .await;
        }

        // Hand the completed record to the async summarizer
        if let Err(e) = self.deps.coordinator.enqueue_for_summary(&session_id).await {
            tracing::warn!(session_id = %session_id, "Summarizer enqueue failed: {}", e);
        }

        metrics::counter!("voice_sessions_ended").increment(1);
    }
}

async fn recv_stt(events: &mut Option<mpsc::Receiver<SttEvent>>) -> Option<SttEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_turn_joins_fragments() {
        let fragments = vec![
            "I wanted to ask".to_string(),
            "  about the pricing ".to_string(),
            String::new(),
        ];
        assert_eq!(assemble_turn(&fragments), "I wanted to ask about the pricing");
    }

    #[test]
    fn test_assemble_turn_empty() {
        assert_eq!(assemble_turn(&[]), "");
        assert_eq!(assemble_turn(&["   ".to_string()]), "");
    }
}
