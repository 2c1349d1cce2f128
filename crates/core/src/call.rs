//! Call-session records and the per-call state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::language::LanguageSwitch;
use crate::transcript::TranscriptEntry;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

/// Telephony-view call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Canceled,
    UserEnded,
    AgentEnded,
}

/// Statuses after which no further transitions are legal
pub const TERMINAL_STATUSES: [CallStatus; 7] = [
    CallStatus::Completed,
    CallStatus::Failed,
    CallStatus::NoAnswer,
    CallStatus::Busy,
    CallStatus::Canceled,
    CallStatus::UserEnded,
    CallStatus::AgentEnded,
];

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Busy => "busy",
            CallStatus::Canceled => "canceled",
            CallStatus::UserEnded => "user-ended",
            CallStatus::AgentEnded => "agent-ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(CallStatus::Initiated),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "no-answer" => Some(CallStatus::NoAnswer),
            "busy" => Some(CallStatus::Busy),
            "canceled" => Some(CallStatus::Canceled),
            "user-ended" => Some(CallStatus::UserEnded),
            "agent-ended" => Some(CallStatus::AgentEnded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(self)
    }

    /// Monotonic progress rank. Webhooks may be redelivered or reordered;
    /// handlers apply a status only when it advances this rank, so a late
    /// `ringing` can never step on `in-progress` or a terminal state.
    pub fn rank(&self) -> u8 {
        match self {
            CallStatus::Initiated => 0,
            CallStatus::Ringing => 1,
            CallStatus::InProgress => 2,
            _ => 3,
        }
    }

    /// Legality of a status edge. Terminal states accept nothing; webhook
    /// redelivery of the same status is treated as a no-op by the caller.
    pub fn can_transition_to(&self, to: CallStatus) -> bool {
        use CallStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (Initiated, Ringing) | (Initiated, Failed) | (Initiated, Canceled) => true,
            (Ringing, InProgress) => true,
            (Ringing, NoAnswer) | (Ringing, Busy) | (Ringing, Canceled) | (Ringing, Failed) => true,
            (Ringing, UserEnded) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            (InProgress, UserEnded) | (InProgress, AgentEnded) => true,
            _ => false,
        }
    }
}

/// Campaign-view status of an outbound attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundStatus {
    Queued,
    Ringing,
    Connected,
    NoAnswer,
    Busy,
    Voicemail,
}

impl OutboundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundStatus::Queued => "queued",
            OutboundStatus::Ringing => "ringing",
            OutboundStatus::Connected => "connected",
            OutboundStatus::NoAnswer => "no_answer",
            OutboundStatus::Busy => "busy",
            OutboundStatus::Voicemail => "voicemail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(OutboundStatus::Queued),
            "ringing" => Some(OutboundStatus::Ringing),
            "connected" => Some(OutboundStatus::Connected),
            "no_answer" => Some(OutboundStatus::NoAnswer),
            "busy" => Some(OutboundStatus::Busy),
            "voicemail" => Some(OutboundStatus::Voicemail),
            _ => None,
        }
    }
}

/// Per-call cost accumulation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub stt_seconds: f64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub tts_characters: u64,
    pub telephony_seconds: u64,
}

/// One dial attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    /// Session UUID used as the gateway custom field and stream key
    pub session_id: String,
    pub user_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub agent_id: Uuid,
    pub phone_id: Option<Uuid>,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub outbound_status: Option<OutboundStatus>,
    pub created_at: DateTime<Utc>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Provider-authoritative talk time when available
    pub duration_sec: Option<u32>,
    /// Provider-assigned call id
    pub external_call_id: Option<String>,
    pub recording_url: Option<String>,
    pub digits: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub language_switches: Vec<LanguageSwitch>,
    pub cost: CostBreakdown,
    /// Session this attempt is retrying, if any
    pub retry_of: Option<Uuid>,
    pub failure_reason: Option<String>,
    /// Holds concurrency lease tokens and campaign linkage
    pub metadata: serde_json::Value,
}

impl CallSession {
    pub fn new_outbound(
        user_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
        agent_id: Uuid,
        phone_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4().to_string(),
            user_id,
            campaign_id: Some(campaign_id),
            contact_id: Some(contact_id),
            agent_id,
            phone_id: Some(phone_id),
            direction: CallDirection::Outbound,
            status: CallStatus::Initiated,
            outbound_status: Some(OutboundStatus::Queued),
            created_at: Utc::now(),
            initiated_at: None,
            started_at: None,
            ended_at: None,
            duration_sec: None,
            external_call_id: None,
            recording_url: None,
            digits: None,
            transcript: Vec::new(),
            language_switches: Vec::new(),
            cost: CostBreakdown::default(),
            retry_of: None,
            failure_reason: None,
            metadata: serde_json::json!({}),
        }
    }

    /// Validate a status edge without applying it
    pub fn check_transition(&self, to: CallStatus) -> Result<(), Error> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(Error::IllegalTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    /// Talk time: provider value when present, computed span otherwise
    pub fn effective_duration_sec(&self) -> Option<u32> {
        if let Some(d) = self.duration_sec {
            return Some(d);
        }
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                let secs = (end - start).num_seconds();
                Some(secs.max(0) as u32)
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> CallSession {
        CallSession::new_outbound(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = outbound();
        assert!(s.check_transition(CallStatus::Ringing).is_ok());
        s.status = CallStatus::Ringing;
        assert!(s.check_transition(CallStatus::InProgress).is_ok());
        s.status = CallStatus::InProgress;
        assert!(s.check_transition(CallStatus::Completed).is_ok());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut s = outbound();
        s.status = CallStatus::Completed;
        for to in TERMINAL_STATUSES {
            assert!(s.check_transition(to).is_err());
        }
        assert!(s.check_transition(CallStatus::Ringing).is_err());
    }

    #[test]
    fn test_no_skip_to_in_progress() {
        let s = outbound();
        // Must pass through ringing first
        assert!(s.check_transition(CallStatus::InProgress).is_err());
    }

    #[test]
    fn test_rank_forward_only() {
        assert!(CallStatus::Ringing.rank() > CallStatus::Initiated.rank());
        assert!(CallStatus::InProgress.rank() > CallStatus::Ringing.rank());
        for terminal in TERMINAL_STATUSES {
            assert!(terminal.rank() > CallStatus::InProgress.rank());
        }
        // Reordered delivery: ringing after in-progress does not advance
        assert!(CallStatus::Ringing.rank() <= CallStatus::InProgress.rank());
    }

    #[test]
    fn test_duration_prefers_provider_value() {
        let mut s = outbound();
        s.started_at = Some(Utc::now() - chrono::Duration::seconds(90));
        s.ended_at = Some(Utc::now());
        s.duration_sec = Some(42);
        assert_eq!(s.effective_duration_sec(), Some(42));

        s.duration_sec = None;
        let computed = s.effective_duration_sec().unwrap();
        assert!((89..=91).contains(&computed));
    }
}
