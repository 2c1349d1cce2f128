//! Status-webhook payload model
//!
//! The provider posts these on every call status transition. Delivery may
//! be repeated, reordered or absent; the orchestrator applies them
//! idempotently and the HTTP handler always answers success.

use serde::{Deserialize, Serialize};

use outdial_core::{CallStatus, OutboundStatus};

/// Provider-side status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl ProviderCallStatus {
    /// Map onto the call-session state machine
    pub fn to_call_status(&self) -> CallStatus {
        match self {
            ProviderCallStatus::Queued => CallStatus::Initiated,
            ProviderCallStatus::Ringing => CallStatus::Ringing,
            ProviderCallStatus::InProgress => CallStatus::InProgress,
            ProviderCallStatus::Completed => CallStatus::Completed,
            ProviderCallStatus::Busy => CallStatus::Busy,
            ProviderCallStatus::Failed => CallStatus::Failed,
            ProviderCallStatus::NoAnswer => CallStatus::NoAnswer,
            ProviderCallStatus::Canceled => CallStatus::Canceled,
        }
    }

    /// Campaign-view status for the same transition
    pub fn to_outbound_status(&self) -> Option<OutboundStatus> {
        match self {
            ProviderCallStatus::Queued => Some(OutboundStatus::Queued),
            ProviderCallStatus::Ringing => Some(OutboundStatus::Ringing),
            ProviderCallStatus::InProgress => Some(OutboundStatus::Connected),
            ProviderCallStatus::NoAnswer => Some(OutboundStatus::NoAnswer),
            ProviderCallStatus::Busy => Some(OutboundStatus::Busy),
            _ => None,
        }
    }
}

/// Inbound status webhook body (form or JSON encoded by the provider)
#[derive(Debug, Clone, Deserialize)]
pub struct StatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "CallFrom")]
    pub call_from: Option<String>,
    #[serde(rename = "CallTo")]
    pub call_to: Option<String>,
    #[serde(rename = "Direction")]
    pub direction: Option<String>,
    #[serde(rename = "Status")]
    pub status: ProviderCallStatus,
    /// Provider-authoritative talk time in seconds
    #[serde(rename = "Duration")]
    pub duration: Option<u32>,
    #[serde(rename = "StartTime")]
    pub start_time: Option<String>,
    #[serde(rename = "EndTime")]
    pub end_time: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
    /// Echo of the dial's custom field (the session uuid)
    #[serde(rename = "CustomField")]
    pub custom_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProviderCallStatus::InProgress.to_call_status(),
            CallStatus::InProgress
        );
        assert_eq!(
            ProviderCallStatus::NoAnswer.to_call_status(),
            CallStatus::NoAnswer
        );
        assert_eq!(
            ProviderCallStatus::InProgress.to_outbound_status(),
            Some(OutboundStatus::Connected)
        );
        assert_eq!(ProviderCallStatus::Completed.to_outbound_status(), None);
    }

    #[test]
    fn test_webhook_deserialization() {
        let payload: StatusWebhook = serde_json::from_str(
            r#"{
                "CallSid": "ext-1",
                "CallFrom": "+14155550100",
                "CallTo": "+14155550001",
                "Direction": "outbound-dial",
                "Status": "in-progress",
                "CustomField": "session-uuid"
            }"#,
        )
        .unwrap();

        assert_eq!(payload.status, ProviderCallStatus::InProgress);
        assert_eq!(payload.call_sid.as_deref(), Some("ext-1"));
        assert_eq!(payload.custom_field.as_deref(), Some("session-uuid"));
        assert!(payload.duration.is_none());
    }

    #[test]
    fn test_terminal_webhook_with_duration() {
        let payload: StatusWebhook = serde_json::from_str(
            r#"{"Status": "completed", "Duration": 73, "RecordingUrl": "https://rec/1.mp3"}"#,
        )
        .unwrap();
        assert_eq!(payload.duration, Some(73));
        assert!(payload.status.to_call_status().is_terminal());
    }
}
