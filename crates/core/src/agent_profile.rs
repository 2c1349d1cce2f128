//! Agent and phone profiles
//!
//! The agent profile carries the enumerated option set a voice session needs:
//! persona, language, voice selection, LLM parameters, STT provider choice,
//! greeting, end-call phrases and voicemail detection. Absent fields
//! deserialize to defaults so older stored profiles keep working.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::language::Language;

/// Streaming STT provider choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    #[default]
    Deepgram,
    Sarvam,
    /// Batch-only fallback
    Whisper,
}

/// TTS provider choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProvider {
    #[default]
    Openai,
    Elevenlabs,
    Deepgram,
    Sarvam,
}

/// Provider-specific synthesis knobs; all optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness: Option<f32>,
}

/// Voice selection plus the per-language voice table used on language switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSelection {
    #[serde(default)]
    pub provider: VoiceProvider,
    pub voice_id: String,
    #[serde(default)]
    pub settings: VoiceSettings,
    /// language code -> voice id override
    #[serde(default)]
    pub language_voices: HashMap<String, String>,
}

impl Default for VoiceSelection {
    fn default() -> Self {
        Self {
            provider: VoiceProvider::Openai,
            voice_id: "alloy".to_string(),
            settings: VoiceSettings::default(),
            language_voices: HashMap::new(),
        }
    }
}

impl VoiceSelection {
    /// Voice for a language, falling back to the configured default
    pub fn voice_for(&self, language: &Language) -> &str {
        self.language_voices
            .get(language.code())
            .map(|s| s.as_str())
            .unwrap_or(&self.voice_id)
    }
}

/// LLM generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    256
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Voicemail detection options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicemailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_voicemail_keywords")]
    pub keywords: Vec<String>,
    /// Seconds from call start during which detection runs
    #[serde(default = "default_min_detection_time")]
    pub min_detection_time: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_voicemail_keywords() -> Vec<String> {
    [
        "leave a message",
        "after the beep",
        "after the tone",
        "voicemail",
        "not available right now",
        "mailbox",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_detection_time() -> u32 {
    3
}

fn default_confidence_threshold() -> f32 {
    0.7
}

impl Default for VoicemailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keywords: default_voicemail_keywords(),
            min_detection_time: default_min_detection_time(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Agent persona plus pipeline provider choices for a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// System persona / prompt free text
    pub prompt: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub enable_auto_language_detection: bool,
    #[serde(default)]
    pub voice: VoiceSelection,
    #[serde(default)]
    pub llm: LlmParams,
    #[serde(default)]
    pub stt_provider: SttProvider,
    /// Spoken before the first user turn
    #[serde(default = "default_first_message")]
    pub first_message: String,
    /// Spoken when an end-call phrase matches
    #[serde(default = "default_goodbye_message")]
    pub goodbye_message: String,
    #[serde(default)]
    pub end_call_phrases: Vec<String>,
    #[serde(default)]
    pub voicemail_detection: VoicemailConfig,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_first_message() -> String {
    "Hello! How can I help you today?".to_string()
}

fn default_goodbye_message() -> String {
    "Thank you for your time. Goodbye!".to_string()
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "agent".to_string(),
            prompt: String::new(),
            language: default_language(),
            enable_auto_language_detection: false,
            voice: VoiceSelection::default(),
            llm: LlmParams::default(),
            stt_provider: SttProvider::Deepgram,
            first_message: default_first_message(),
            goodbye_message: default_goodbye_message(),
            end_call_phrases: Vec::new(),
            voicemail_detection: VoicemailConfig::default(),
        }
    }
}

/// Outbound phone with references to its encrypted gateway credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    /// E.164 caller id
    pub number: String,
    /// Gateway subdomain, e.g. "api.example-telephony.com"
    pub subdomain: String,
    pub account_sid: String,
    pub app_id: String,
    /// AES-GCM ciphertext, decrypted at dial time
    pub encrypted_api_key: String,
    pub encrypted_api_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_from_empty_json() {
        let profile: AgentProfile = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "name": "sales",
            "prompt": "You are a helpful sales agent."
        }))
        .unwrap();

        assert_eq!(profile.language, "en");
        assert_eq!(profile.stt_provider, SttProvider::Deepgram);
        assert!(!profile.voicemail_detection.enabled);
        assert!((profile.voicemail_detection.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(profile.voicemail_detection.min_detection_time, 3);
    }

    #[test]
    fn test_voice_table_lookup() {
        let mut selection = VoiceSelection::default();
        selection
            .language_voices
            .insert("hi".to_string(), "hindi-voice".to_string());

        assert_eq!(selection.voice_for(&Language::new("hi")), "hindi-voice");
        assert_eq!(selection.voice_for(&Language::new("en")), "alloy");
    }
}
