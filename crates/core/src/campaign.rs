//! Campaign records and settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CampaignStatus::Draft),
            "scheduled" => Some(CampaignStatus::Scheduled),
            "active" => Some(CampaignStatus::Active),
            "paused" => Some(CampaignStatus::Paused),
            "completed" => Some(CampaignStatus::Completed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            "failed" => Some(CampaignStatus::Failed),
            _ => None,
        }
    }

    /// Once here, counters are frozen and no contact transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }

    /// `start` is legal from these states
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Draft | CampaignStatus::Scheduled | CampaignStatus::Paused
        )
    }
}

/// Contact ordering when enqueueing onto the waitlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    #[default]
    Fifo,
    Lifo,
    Priority,
}

impl PriorityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityMode::Fifo => "fifo",
            PriorityMode::Lifo => "lifo",
            PriorityMode::Priority => "priority",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fifo" => Some(PriorityMode::Fifo),
            "lifo" => Some(PriorityMode::Lifo),
            "priority" => Some(PriorityMode::Priority),
            _ => None,
        }
    }
}

/// Per-campaign dialing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    /// Re-queue failed/no-answer/busy contacts
    #[serde(default = "default_true")]
    pub retry_failed: bool,
    /// Retry ceiling per contact, 0..=10
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before a retry attempt, >= 1
    #[serde(default = "default_retry_delay")]
    pub retry_delay_minutes: u32,
    /// Voicemail outcomes are final (no retry)
    #[serde(default)]
    pub exclude_voicemail: bool,
    #[serde(default)]
    pub priority_mode: PriorityMode,
    /// Maximum simultaneously active calls, 1..=100
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: u32,
    /// Every 4th promotion reads the normal tier even when high is non-empty
    #[serde(default)]
    pub fair_tier_rotation: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u32 {
    30
}

fn default_concurrent_limit() -> u32 {
    5
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            retry_failed: true,
            max_retries: default_max_retries(),
            retry_delay_minutes: default_retry_delay(),
            exclude_voicemail: false,
            priority_mode: PriorityMode::Fifo,
            concurrent_limit: default_concurrent_limit(),
            fair_tier_rotation: false,
        }
    }
}

impl CampaignSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_retries > 10 {
            return Err(Error::Validation(format!(
                "max_retries must be in [0, 10], got {}",
                self.max_retries
            )));
        }
        if self.retry_delay_minutes < 1 {
            return Err(Error::Validation(
                "retry_delay_minutes must be at least 1".to_string(),
            ));
        }
        if self.concurrent_limit < 1 || self.concurrent_limit > 100 {
            return Err(Error::Validation(format!(
                "concurrent_limit must be in [1, 100], got {}",
                self.concurrent_limit
            )));
        }
        Ok(())
    }
}

/// Per-campaign tallies; mutated only via monotonic increments
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CampaignCounters {
    pub total_contacts: u64,
    pub queued_calls: u64,
    pub active_calls: u64,
    pub completed_calls: u64,
    pub failed_calls: u64,
    pub voicemail_calls: u64,
}

impl CampaignCounters {
    /// Contacts with a settled outcome
    pub fn settled(&self) -> u64 {
        self.completed_calls + self.failed_calls + self.voicemail_calls
    }

    /// Fraction of contacts settled, 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.total_contacts == 0 {
            return 0.0;
        }
        self.settled() as f64 / self.total_contacts as f64
    }
}

/// A logical batch of outbound calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub phone_id: Option<Uuid>,
    pub name: String,
    pub status: CampaignStatus,
    pub settings: CampaignSettings,
    pub counters: CampaignCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Campaign-level errors are recorded here, not surfaced as failures
    pub metadata: Option<serde_json::Value>,
}

impl Campaign {
    pub fn new(user_id: Uuid, agent_id: Uuid, name: impl Into<String>, settings: CampaignSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            agent_id,
            phone_id: None,
            name: name.into(),
            status: CampaignStatus::Draft,
            settings,
            counters: CampaignCounters::default(),
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            metadata: None,
        }
    }

    /// Validate a lifecycle edge without applying it
    pub fn check_transition(&self, to: CampaignStatus) -> Result<(), Error> {
        use CampaignStatus::*;
        let ok = match (self.status, to) {
            (Draft, Active) | (Scheduled, Active) | (Paused, Active) => true,
            (Draft, Scheduled) => true,
            (Active, Paused) => true,
            (Active, Completed) => true,
            (Draft, Cancelled) | (Scheduled, Cancelled) | (Active, Cancelled) | (Paused, Cancelled) => true,
            (Active, Failed) | (Paused, Failed) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::IllegalTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_bounds() {
        let mut s = CampaignSettings::default();
        assert!(s.validate().is_ok());

        s.max_retries = 11;
        assert!(s.validate().is_err());

        s.max_retries = 10;
        s.concurrent_limit = 0;
        assert!(s.validate().is_err());

        s.concurrent_limit = 101;
        assert!(s.validate().is_err());

        s.concurrent_limit = 100;
        s.retry_delay_minutes = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_lifecycle_edges() {
        let mut campaign = Campaign::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "test",
            CampaignSettings::default(),
        );

        assert!(campaign.check_transition(CampaignStatus::Active).is_ok());
        assert!(campaign.check_transition(CampaignStatus::Paused).is_err());

        campaign.status = CampaignStatus::Active;
        assert!(campaign.check_transition(CampaignStatus::Paused).is_ok());
        assert!(campaign.check_transition(CampaignStatus::Cancelled).is_ok());

        campaign.status = CampaignStatus::Cancelled;
        assert!(campaign.check_transition(CampaignStatus::Active).is_err());
        assert!(campaign.status.is_terminal());
    }

    #[test]
    fn test_counter_progress() {
        let counters = CampaignCounters {
            total_contacts: 10,
            completed_calls: 3,
            failed_calls: 1,
            voicemail_calls: 1,
            ..Default::default()
        };
        assert_eq!(counters.settled(), 5);
        assert!((counters.progress() - 0.5).abs() < f64::EPSILON);
    }
}
