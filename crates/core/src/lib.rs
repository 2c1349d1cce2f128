//! Core types for the outbound campaign dialer
//!
//! This crate provides foundational types used across all other crates:
//! - Campaign, contact and call-session domain records
//! - Concurrency lease tokens and tagged slot-operation results
//! - Transcript and language types
//! - Agent/phone profiles (voice, LLM, STT, voicemail options)
//! - Telephony audio frame utilities (PCM16, 8 kHz)
//! - Error types

pub mod agent_profile;
pub mod audio;
pub mod call;
pub mod campaign;
pub mod contact;
pub mod error;
pub mod language;
pub mod lease;
pub mod transcript;

pub use agent_profile::{
    AgentProfile, LlmParams, PhoneProfile, SttProvider, VoicemailConfig, VoiceProvider,
    VoiceSelection, VoiceSettings,
};
pub use audio::{pcm16_from_samples, samples_from_pcm16, resample, TELEPHONY_SAMPLE_RATE};
pub use call::{
    CallDirection, CallSession, CallStatus, CostBreakdown, OutboundStatus, TERMINAL_STATUSES,
};
pub use campaign::{Campaign, CampaignCounters, CampaignSettings, CampaignStatus, PriorityMode};
pub use contact::{validate_phone, CampaignContact, ContactStatus};
pub use error::{Error, Result};
pub use language::{Language, LanguageSwitch};
pub use lease::{AcquireOutcome, ForceReleased, JobOrigin, LeaseKind, ReleaseOutcome, SlotToken, UpgradeOutcome};
pub use transcript::{Speaker, TranscriptEntry};
