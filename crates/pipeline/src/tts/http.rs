//! HTTP TTS provider clients
//!
//! Each provider is asked for PCM or WAV output at the highest telephony-
//! friendly rate it supports; `decode_to_telephony_pcm` brings the result
//! to 8 kHz PCM16 for framing.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use outdial_core::VoiceProvider;

use super::{decode_to_telephony_pcm, TtsClient, TtsRequest};
use crate::PipelineError;

/// Provider endpoints and keys
#[derive(Debug, Clone, Default)]
pub struct TtsProviderConfig {
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub deepgram_api_key: String,
    pub sarvam_api_key: String,
}

/// Dispatching TTS client over the configured providers
pub struct HttpTtsClient {
    provider: VoiceProvider,
    config: TtsProviderConfig,
    client: reqwest::Client,
}

impl HttpTtsClient {
    pub fn new(provider: VoiceProvider, config: TtsProviderConfig) -> Self {
        Self {
            provider,
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn synthesize_openai(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError> {
        let body = json!({
            "model": request.settings.model_id.as_deref().unwrap_or("tts-1"),
            "input": request.text,
            "voice": request.voice_id,
            "response_format": "wav",
        });

        let bytes = self
            .post_bytes(
                "https://api.openai.com/v1/audio/speech",
                Some(&self.config.openai_api_key),
                &body,
            )
            .await?;
        decode_to_telephony_pcm(&bytes, 24000)
    }

    async fn synthesize_elevenlabs(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=pcm_16000",
            request.voice_id
        );
        let body = json!({
            "text": request.text,
            "model_id": request.settings.model_id.as_deref().unwrap_or("eleven_turbo_v2_5"),
            "voice_settings": {
                "stability": request.settings.stability.unwrap_or(0.5),
                "similarity_boost": request.settings.similarity_boost.unwrap_or(0.75),
            }
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.elevenlabs_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        let bytes = Self::check_bytes(response).await?;
        decode_to_telephony_pcm(&bytes, 16000)
    }

    async fn synthesize_deepgram(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError> {
        let model = request
            .settings
            .model_id
            .clone()
            .unwrap_or_else(|| format!("aura-{}", request.voice_id));
        let url = format!(
            "https://api.deepgram.com/v1/speak?model={}&encoding=linear16&sample_rate=8000&container=none",
            model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.config.deepgram_api_key))
            .json(&json!({ "text": request.text }))
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        let bytes = Self::check_bytes(response).await?;
        decode_to_telephony_pcm(&bytes, 8000)
    }

    async fn synthesize_sarvam(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError> {
        #[derive(Deserialize)]
        struct SarvamResponse {
            audios: Vec<String>,
        }

        let body = json!({
            "inputs": [request.text],
            "target_language_code": request.language.code(),
            "speaker": request.voice_id,
            "pitch": request.settings.pitch.unwrap_or(0.0),
            "pace": request.settings.pace.unwrap_or(1.0),
            "loudness": request.settings.loudness.unwrap_or(1.0),
            "speech_sample_rate": 8000,
        });

        let response = self
            .client
            .post("https://api.sarvam.ai/text-to-speech")
            .header("api-subscription-key", &self.config.sarvam_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!("HTTP {}: {}", status, body)));
        }

        let parsed: SarvamResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;
        let encoded = parsed
            .audios
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Tts("empty synthesis response".to_string()))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| PipelineError::Tts(format!("bad audio base64: {}", e)))?;
        decode_to_telephony_pcm(&bytes, 8000)
    }

    async fn post_bytes(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;
        Self::check_bytes(response).await
    }

    async fn check_bytes(response: reqwest::Response) -> Result<Vec<u8>, PipelineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!("HTTP {}: {}", status, body)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>, PipelineError> {
        match self.provider {
            VoiceProvider::Openai => self.synthesize_openai(request).await,
            VoiceProvider::Elevenlabs => self.synthesize_elevenlabs(request).await,
            VoiceProvider::Deepgram => self.synthesize_deepgram(request).await,
            VoiceProvider::Sarvam => self.synthesize_sarvam(request).await,
        }
    }
}
