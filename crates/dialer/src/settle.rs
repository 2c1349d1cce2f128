//! Contact settlement and the retry policy
//!
//! When a call reaches a terminal status the contact settles per policy:
//!
//! | outcome                          | contact        | counters          |
//! |----------------------------------|----------------|-------------------|
//! | completed / in-progress          | completed      | completed += 1    |
//! | voicemail, excludeVoicemail      | voicemail      | voicemail += 1    |
//! | voicemail, retries allowed       | pending(+delay)| voicemail += 1    |
//! | failed/no-answer/busy, retryable | pending(+delay)| queued += 1       |
//! | otherwise                        | failed         | failed += 1       |
//!
//! Every settle decrements the active counter it entered `calling` with.
//! Counters on terminal campaigns are frozen; settlement then only touches
//! the contact row.

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use outdial_core::{CallStatus, Campaign, ContactStatus};
use outdial_persistence::{CounterField, PersistenceLayer};

use crate::DialerError;

/// Call outcome as seen by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Voicemail,
    Failed,
    NoAnswer,
    Busy,
    Canceled,
    /// Invalid credentials, disabled account: never retried
    PermanentFailure,
}

impl CallOutcome {
    /// Derive the policy outcome from a terminal call status and the
    /// session's failure reason (voicemail is flagged there).
    pub fn from_terminal(status: CallStatus, failure_reason: Option<&str>) -> Self {
        if failure_reason == Some("voicemail") {
            return CallOutcome::Voicemail;
        }
        match status {
            CallStatus::Completed | CallStatus::UserEnded | CallStatus::AgentEnded => {
                CallOutcome::Completed
            },
            CallStatus::NoAnswer => CallOutcome::NoAnswer,
            CallStatus::Busy => CallOutcome::Busy,
            CallStatus::Canceled => CallOutcome::Canceled,
            _ => CallOutcome::Failed,
        }
    }

    fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            CallOutcome::Failed | CallOutcome::NoAnswer | CallOutcome::Busy
        )
    }
}

/// What settlement decided, for tests and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleDecision {
    Completed,
    VoicemailFinal,
    VoicemailRetry,
    RetryScheduled,
    Failed,
    Skipped,
}

/// Pure policy: decide a contact's fate from the outcome and settings
pub fn decide(
    outcome: CallOutcome,
    retry_failed: bool,
    exclude_voicemail: bool,
    retry_count: u32,
    max_retries: u32,
) -> SettleDecision {
    match outcome {
        CallOutcome::Completed => SettleDecision::Completed,
        CallOutcome::PermanentFailure => SettleDecision::Failed,
        CallOutcome::Voicemail if exclude_voicemail => SettleDecision::VoicemailFinal,
        CallOutcome::Voicemail => {
            if retry_count < max_retries {
                SettleDecision::VoicemailRetry
            } else {
                SettleDecision::VoicemailFinal
            }
        },
        CallOutcome::Canceled => SettleDecision::Skipped,
        outcome if outcome.is_retryable_failure() && retry_failed && retry_count < max_retries => {
            SettleDecision::RetryScheduled
        },
        _ => SettleDecision::Failed,
    }
}

/// Applies settlement decisions to the stores
#[derive(Clone)]
pub struct ContactSettler {
    persistence: PersistenceLayer,
}

impl ContactSettler {
    pub fn new(persistence: PersistenceLayer) -> Self {
        Self { persistence }
    }

    /// Settle one contact after its call reached a terminal status.
    /// Returns the decision taken.
    pub async fn settle(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
        outcome: CallOutcome,
        failure_reason: Option<&str>,
    ) -> Result<SettleDecision, DialerError> {
        let campaign = self
            .persistence
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!(
                    "campaign {}",
                    campaign_id
                )))
            })?;

        let Some(contact) = self
            .persistence
            .contacts
            .get(campaign_id, contact_id)
            .await?
        else {
            tracing::warn!(campaign_id = %campaign_id, contact_id = %contact_id, "Settle for unknown contact");
            return Ok(SettleDecision::Skipped);
        };

        if contact.status.is_settled() {
            // Redelivered terminal webhook; nothing to do
            return Ok(SettleDecision::Skipped);
        }

        let decision = decide(
            outcome,
            campaign.settings.retry_failed,
            campaign.settings.exclude_voicemail,
            contact.retry_count,
            campaign.settings.max_retries,
        );

        let counters_live = !campaign.status.is_terminal();
        let delay = ChronoDuration::minutes(campaign.settings.retry_delay_minutes as i64);

        match decision {
            SettleDecision::Completed => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Completed,
                        contact.retry_count,
                        None,
                        None,
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                    self.adjust(campaign_id, CounterField::CompletedCalls, 1).await?;
                }
            },
            SettleDecision::VoicemailFinal => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Voicemail,
                        contact.retry_count,
                        None,
                        Some("voicemail"),
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                    self.adjust(campaign_id, CounterField::VoicemailCalls, 1).await?;
                }
            },
            SettleDecision::VoicemailRetry => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Pending,
                        contact.retry_count + 1,
                        Some(Utc::now() + delay),
                        Some("voicemail"),
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                    self.adjust(campaign_id, CounterField::VoicemailCalls, 1).await?;
                    self.adjust(campaign_id, CounterField::QueuedCalls, 1).await?;
                }
            },
            SettleDecision::RetryScheduled => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Pending,
                        contact.retry_count + 1,
                        Some(Utc::now() + delay),
                        failure_reason,
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                    self.adjust(campaign_id, CounterField::QueuedCalls, 1).await?;
                }
            },
            SettleDecision::Failed => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Failed,
                        contact.retry_count,
                        None,
                        failure_reason,
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                    self.adjust(campaign_id, CounterField::FailedCalls, 1).await?;
                }
            },
            SettleDecision::Skipped => {
                self.persistence
                    .contacts
                    .record_attempt(
                        campaign_id,
                        contact_id,
                        ContactStatus::Skipped,
                        contact.retry_count,
                        None,
                        failure_reason,
                    )
                    .await?;
                if counters_live {
                    self.adjust(campaign_id, CounterField::ActiveCalls, -1).await?;
                }
            },
        }

        tracing::info!(
            campaign_id = %campaign_id,
            contact_id = %contact_id,
            ?outcome,
            ?decision,
            "Contact settled"
        );
        metrics::counter!("contacts_settled").increment(1);

        self.maybe_complete_campaign(&campaign).await?;
        Ok(decision)
    }

    async fn adjust(
        &self,
        campaign_id: Uuid,
        field: CounterField,
        delta: i64,
    ) -> Result<(), DialerError> {
        self.persistence
            .campaigns
            .increment(campaign_id, field, delta)
            .await?;
        Ok(())
    }

    /// Flip an active campaign to completed once nothing is queued or live
    async fn maybe_complete_campaign(&self, campaign: &Campaign) -> Result<(), DialerError> {
        if campaign.status != outdial_core::CampaignStatus::Active {
            return Ok(());
        }
        let counters = self.persistence.campaigns.counters(campaign.id).await?;
        if counters.total_contacts > 0 && counters.queued_calls == 0 && counters.active_calls == 0 {
            self.persistence
                .campaigns
                .set_status(campaign.id, outdial_core::CampaignStatus::Completed)
                .await?;
            tracing::info!(campaign_id = %campaign.id, "Campaign completed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_always_settles() {
        assert_eq!(
            decide(CallOutcome::Completed, true, true, 9, 2),
            SettleDecision::Completed
        );
    }

    #[test]
    fn test_voicemail_excluded_is_final() {
        assert_eq!(
            decide(CallOutcome::Voicemail, true, true, 0, 3),
            SettleDecision::VoicemailFinal
        );
    }

    #[test]
    fn test_voicemail_retries_when_allowed() {
        assert_eq!(
            decide(CallOutcome::Voicemail, true, false, 1, 3),
            SettleDecision::VoicemailRetry
        );
        assert_eq!(
            decide(CallOutcome::Voicemail, true, false, 3, 3),
            SettleDecision::VoicemailFinal
        );
    }

    #[test]
    fn test_failures_respect_retry_budget() {
        assert_eq!(
            decide(CallOutcome::NoAnswer, true, false, 0, 2),
            SettleDecision::RetryScheduled
        );
        assert_eq!(
            decide(CallOutcome::Busy, true, false, 1, 2),
            SettleDecision::RetryScheduled
        );
        // Budget exhausted
        assert_eq!(
            decide(CallOutcome::Failed, true, false, 2, 2),
            SettleDecision::Failed
        );
        // Retries disabled
        assert_eq!(
            decide(CallOutcome::Failed, false, false, 0, 2),
            SettleDecision::Failed
        );
    }

    #[test]
    fn test_permanent_failure_never_retries() {
        assert_eq!(
            decide(CallOutcome::PermanentFailure, true, false, 0, 5),
            SettleDecision::Failed
        );
    }

    #[test]
    fn test_canceled_skips() {
        assert_eq!(
            decide(CallOutcome::Canceled, true, false, 0, 2),
            SettleDecision::Skipped
        );
    }

    #[test]
    fn test_outcome_from_terminal() {
        assert_eq!(
            CallOutcome::from_terminal(CallStatus::Completed, None),
            CallOutcome::Completed
        );
        assert_eq!(
            CallOutcome::from_terminal(CallStatus::Completed, Some("voicemail")),
            CallOutcome::Voicemail
        );
        assert_eq!(
            CallOutcome::from_terminal(CallStatus::NoAnswer, None),
            CallOutcome::NoAnswer
        );
        assert_eq!(
            CallOutcome::from_terminal(CallStatus::UserEnded, None),
            CallOutcome::Completed
        );
        assert_eq!(
            CallOutcome::from_terminal(CallStatus::Failed, Some("gateway 500")),
            CallOutcome::Failed
        );
    }
}
