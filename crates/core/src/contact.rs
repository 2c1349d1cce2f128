//! Dialable contact rows

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid regex"));

/// Validate an E.164 phone number
pub fn validate_phone(phone: &str) -> Result<(), Error> {
    if E164.is_match(phone) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid E.164 phone: {}", phone)))
    }
}

/// Per-contact dial status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Pending,
    Queued,
    Calling,
    Completed,
    Failed,
    Voicemail,
    Skipped,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Queued => "queued",
            ContactStatus::Calling => "calling",
            ContactStatus::Completed => "completed",
            ContactStatus::Failed => "failed",
            ContactStatus::Voicemail => "voicemail",
            ContactStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ContactStatus::Pending),
            "queued" => Some(ContactStatus::Queued),
            "calling" => Some(ContactStatus::Calling),
            "completed" => Some(ContactStatus::Completed),
            "failed" => Some(ContactStatus::Failed),
            "voicemail" => Some(ContactStatus::Voicemail),
            "skipped" => Some(ContactStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ContactStatus::Completed
                | ContactStatus::Failed
                | ContactStatus::Voicemail
                | ContactStatus::Skipped
        )
    }
}

/// One dialable row; (campaign_id, phone) is unique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Free-form context forwarded into the agent prompt
    pub custom_data: Option<serde_json::Value>,
    pub status: ContactStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Higher dials sooner in priority mode
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl CampaignContact {
    pub fn new(campaign_id: Uuid, phone: impl Into<String>) -> Result<Self, Error> {
        let phone = phone.into();
        validate_phone(&phone)?;
        Ok(Self {
            id: Uuid::new_v4(),
            campaign_id,
            phone,
            name: None,
            email: None,
            custom_data: None,
            status: ContactStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            last_attempt_at: None,
            failure_reason: None,
            priority: 0,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone("+14155550001").is_ok());
        assert!(validate_phone("+919876543210").is_ok());

        assert!(validate_phone("14155550001").is_err()); // missing +
        assert!(validate_phone("+04155550001").is_err()); // leading zero
        assert!(validate_phone("+1").is_err()); // too short
        assert!(validate_phone("+123456789012345678").is_err()); // too long
        assert!(validate_phone("+1415555000a").is_err()); // non-digit
    }

    #[test]
    fn test_contact_creation_rejects_bad_phone() {
        let campaign = Uuid::new_v4();
        assert!(CampaignContact::new(campaign, "+14155550001").is_ok());
        assert!(CampaignContact::new(campaign, "not-a-phone").is_err());
    }

    #[test]
    fn test_settled_statuses() {
        assert!(!ContactStatus::Pending.is_settled());
        assert!(!ContactStatus::Queued.is_settled());
        assert!(!ContactStatus::Calling.is_settled());
        assert!(ContactStatus::Completed.is_settled());
        assert!(ContactStatus::Skipped.is_settled());
    }
}
