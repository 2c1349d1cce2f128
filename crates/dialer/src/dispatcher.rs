//! Campaign dispatcher
//!
//! Owns campaign lifecycle, bulk contact enqueue, retry re-queues, limit
//! changes and purge. The promoter hands reserved jobs to `process`, which
//! moves the contact into `calling` and dials.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use outdial_core::{
    Campaign, CampaignContact, CampaignSettings, CampaignStatus, ContactStatus, JobOrigin,
    PriorityMode, SlotToken,
};
use outdial_coordination::{Coordinator, SlotManager, Waitlist};
use outdial_persistence::{BulkAddReport, CounterField, PersistenceLayer};

use crate::orchestrator::CallOrchestrator;
use crate::DialerError;

/// Paused-flag TTL; refreshed by the scheduler while a campaign stays
/// paused, so a crashed dispatcher cannot wedge promotion forever
const PAUSED_TTL_SECS: u64 = 300;

/// One row of a bulk contact upload
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContactRow {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: i32,
}

/// Campaign dispatcher handle
#[derive(Clone)]
pub struct CampaignDispatcher {
    persistence: PersistenceLayer,
    coordinator: Coordinator,
    slots: SlotManager,
    waitlist: Waitlist,
    orchestrator: Arc<CallOrchestrator>,
    purge_grace: Duration,
}

impl CampaignDispatcher {
    pub fn new(
        persistence: PersistenceLayer,
        coordinator: Coordinator,
        slots: SlotManager,
        waitlist: Waitlist,
        orchestrator: Arc<CallOrchestrator>,
        purge_grace: Duration,
    ) -> Self {
        Self {
            persistence,
            coordinator,
            slots,
            waitlist,
            orchestrator,
            purge_grace,
        }
    }

    async fn load(&self, campaign_id: Uuid) -> Result<Campaign, DialerError> {
        self.persistence
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!(
                    "campaign {}",
                    campaign_id
                )))
            })
    }

    /// Create a campaign after validating agent and phone ownership
    pub async fn create(
        &self,
        user_id: Uuid,
        agent_id: Uuid,
        phone_id: Option<Uuid>,
        name: String,
        settings: CampaignSettings,
        scheduled_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Campaign, DialerError> {
        settings.validate().map_err(DialerError::Core)?;
        self.persistence
            .profiles
            .get_owned_agent(agent_id, user_id)
            .await?;
        if let Some(phone_id) = phone_id {
            self.persistence
                .profiles
                .get_owned_phone(phone_id, user_id)
                .await?;
        }

        let mut campaign = Campaign::new(user_id, agent_id, name, settings);
        campaign.phone_id = phone_id;
        if scheduled_at.is_some() {
            campaign.status = CampaignStatus::Scheduled;
            campaign.scheduled_at = scheduled_at;
        }

        self.persistence.campaigns.create(&campaign).await?;
        tracing::info!(campaign_id = %campaign.id, "Campaign created");
        Ok(campaign)
    }

    /// Bulk insert contacts, deduplicating on phone
    pub async fn add_contacts(
        &self,
        campaign_id: Uuid,
        rows: Vec<ContactRow>,
    ) -> Result<BulkAddReport, DialerError> {
        let campaign = self.load(campaign_id).await?;
        if campaign.status.is_terminal() {
            return Err(DialerError::Core(outdial_core::Error::Conflict(
                "campaign is finished".to_string(),
            )));
        }

        let mut contacts = Vec::with_capacity(rows.len());
        let mut report = BulkAddReport::default();
        for row in rows {
            match CampaignContact::new(campaign_id, row.phone) {
                Ok(mut contact) => {
                    contact.name = row.name;
                    contact.email = row.email;
                    contact.custom_data = row.custom_data;
                    contact.priority = row.priority;
                    contacts.push(contact);
                },
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        let inserted = self.persistence.contacts.bulk_insert(contacts).await?;
        report.added = inserted.added;
        report.duplicates = inserted.duplicates;
        report.errors.extend(inserted.errors);

        if report.added > 0 {
            self.persistence
                .campaigns
                .increment(campaign_id, CounterField::TotalContacts, report.added as i64)
                .await?;
            self.persistence
                .campaigns
                .increment(campaign_id, CounterField::QueuedCalls, report.added as i64)
                .await?;

            // A running campaign picks new contacts up immediately
            if campaign.status == CampaignStatus::Active {
                self.enqueue_pending(&campaign).await?;
                self.coordinator.publish_slot_available(campaign_id).await?;
            }
        }

        tracing::info!(
            campaign_id = %campaign_id,
            added = report.added,
            duplicates = report.duplicates,
            errors = report.errors.len(),
            "Contacts added"
        );
        Ok(report)
    }

    /// Start (or resume from draft/scheduled/paused) a campaign
    pub async fn start(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        if !campaign.status.can_start() {
            return Err(DialerError::Core(outdial_core::Error::IllegalTransition {
                from: campaign.status.as_str().to_string(),
                to: CampaignStatus::Active.as_str().to_string(),
            }));
        }

        let counters = self.persistence.campaigns.counters(campaign_id).await?;
        if counters.total_contacts == 0 {
            return Err(DialerError::Core(outdial_core::Error::Validation(
                "campaign has no contacts".to_string(),
            )));
        }
        // The agent must still exist and belong to the campaign owner
        self.persistence
            .profiles
            .get_owned_agent(campaign.agent_id, campaign.user_id)
            .await?;

        self.slots
            .set_limit(campaign_id, campaign.settings.concurrent_limit)
            .await?;
        self.coordinator.clear_paused(campaign_id).await?;

        self.persistence
            .campaigns
            .set_status(campaign_id, CampaignStatus::Active)
            .await?;

        let queued = self.enqueue_pending(&campaign).await?;
        self.coordinator.publish_slot_available(campaign_id).await?;

        tracing::info!(campaign_id = %campaign_id, queued, "Campaign started");
        Ok(())
    }

    /// Push every pending contact onto the waitlist in the campaign's
    /// priority order. Returns the number enqueued.
    async fn enqueue_pending(&self, campaign: &Campaign) -> Result<usize, DialerError> {
        let mut pending = self
            .persistence
            .contacts
            .list_by_status(campaign.id, ContactStatus::Pending)
            .await?;
        // Retry-scheduled contacts wait for their delay
        pending.retain(|c| c.next_retry_at.map(|t| t <= Utc::now()).unwrap_or(true));

        match campaign.settings.priority_mode {
            PriorityMode::Priority => {
                pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
            },
            _ => pending.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }

        let count = pending.len();
        for contact in pending {
            let origin = match campaign.settings.priority_mode {
                PriorityMode::Priority if contact.priority > 0 => JobOrigin::High,
                _ => JobOrigin::Normal,
            };
            self.waitlist
                .push(campaign.id, &contact.id.to_string(), origin)
                .await?;
            self.persistence
                .contacts
                .set_status(campaign.id, contact.id, ContactStatus::Queued)
                .await?;
        }
        Ok(count)
    }

    pub async fn pause(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        campaign
            .check_transition(CampaignStatus::Paused)
            .map_err(DialerError::Core)?;

        self.coordinator
            .set_paused(campaign_id, PAUSED_TTL_SECS)
            .await?;
        self.persistence
            .campaigns
            .set_status(campaign_id, CampaignStatus::Paused)
            .await?;
        tracing::info!(campaign_id = %campaign_id, "Campaign paused");
        Ok(())
    }

    pub async fn resume(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        if campaign.status != CampaignStatus::Paused {
            return Err(DialerError::Core(outdial_core::Error::IllegalTransition {
                from: campaign.status.as_str().to_string(),
                to: CampaignStatus::Active.as_str().to_string(),
            }));
        }

        self.coordinator.clear_paused(campaign_id).await?;
        self.persistence
            .campaigns
            .set_status(campaign_id, CampaignStatus::Active)
            .await?;
        self.coordinator.publish_slot_available(campaign_id).await?;
        tracing::info!(campaign_id = %campaign_id, "Campaign resumed");
        Ok(())
    }

    /// Cancel: stop promotions, drop queued jobs, skip unsettled contacts.
    /// Active calls finish naturally.
    pub async fn cancel(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        campaign
            .check_transition(CampaignStatus::Cancelled)
            .map_err(DialerError::Core)?;

        self.coordinator
            .set_paused(campaign_id, PAUSED_TTL_SECS)
            .await?;
        let drained = self.waitlist.drain(campaign_id).await?;
        tracing::info!(campaign_id = %campaign_id, drained = drained.len(), "Waitlist drained");

        let mut skipped = 0i64;
        for status in [ContactStatus::Pending, ContactStatus::Queued] {
            for contact in self
                .persistence
                .contacts
                .list_by_status(campaign_id, status)
                .await?
            {
                self.persistence
                    .contacts
                    .set_status(campaign_id, contact.id, ContactStatus::Skipped)
                    .await?;
                skipped += 1;
            }
        }
        if skipped > 0 {
            self.persistence
                .campaigns
                .increment(campaign_id, CounterField::QueuedCalls, -skipped)
                .await?;
        }

        // Counters freeze at this edge
        self.persistence
            .campaigns
            .set_status(campaign_id, CampaignStatus::Cancelled)
            .await?;
        tracing::info!(campaign_id = %campaign_id, skipped, "Campaign cancelled");
        Ok(())
    }

    /// Re-enqueue failed contacts that still have retry budget
    pub async fn retry_failed(&self, campaign_id: Uuid) -> Result<u64, DialerError> {
        let campaign = self.load(campaign_id).await?;
        if campaign.status.is_terminal() {
            return Err(DialerError::Core(outdial_core::Error::Conflict(
                "campaign is finished".to_string(),
            )));
        }

        let delay = chrono::Duration::minutes(campaign.settings.retry_delay_minutes as i64);
        let mut requeued = 0i64;

        for contact in self
            .persistence
            .contacts
            .list_by_status(campaign_id, ContactStatus::Failed)
            .await?
        {
            if contact.retry_count >= campaign.settings.max_retries {
                continue;
            }
            self.persistence
                .contacts
                .record_attempt(
                    campaign_id,
                    contact.id,
                    ContactStatus::Pending,
                    contact.retry_count,
                    Some(Utc::now() + delay),
                    contact.failure_reason.as_deref(),
                )
                .await?;
            requeued += 1;
        }

        if requeued > 0 {
            self.persistence
                .campaigns
                .increment(campaign_id, CounterField::FailedCalls, -requeued)
                .await?;
            self.persistence
                .campaigns
                .increment(campaign_id, CounterField::QueuedCalls, requeued)
                .await?;
        }

        tracing::info!(campaign_id = %campaign_id, requeued, "Failed contacts re-enqueued");
        Ok(requeued as u64)
    }

    /// Change the concurrency limit. Reducing below 0.9x of current active
    /// occupancy is rejected so live calls are never orphaned.
    pub async fn set_concurrent_limit(
        &self,
        campaign_id: Uuid,
        limit: u32,
    ) -> Result<(), DialerError> {
        if limit < 1 || limit > 100 {
            return Err(DialerError::Core(outdial_core::Error::Validation(format!(
                "concurrent_limit must be in [1, 100], got {}",
                limit
            ))));
        }

        let mut campaign = self.load(campaign_id).await?;
        let counts = self.slots.counts(campaign_id).await?;
        if counts.active as f64 > outdial_config::constants::slots::SATURATION_FRACTION * limit as f64 {
            return Err(DialerError::Core(outdial_core::Error::NearSaturation {
                active: counts.active,
                requested: limit,
            }));
        }

        campaign.settings.concurrent_limit = limit;
        self.persistence
            .campaigns
            .update_settings(campaign_id, &campaign.settings)
            .await?;
        self.slots.set_limit(campaign_id, limit).await?;

        // A raise opens slots; wake the promoter
        self.coordinator.publish_slot_available(campaign_id).await?;
        tracing::info!(campaign_id = %campaign_id, limit, "Concurrency limit updated");
        Ok(())
    }

    /// Forceful teardown: pause, grace, force-release every lease, delete
    /// every coordination key
    pub async fn purge(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        if campaign.status == CampaignStatus::Active {
            self.pause(campaign_id).await?;
        }

        tokio::time::sleep(self.purge_grace).await;

        for member in self.slots.lease_members(campaign_id).await? {
            let call_id = member.strip_prefix("pre-").unwrap_or(&member);
            let _ = self.slots.force_release(campaign_id, call_id, false).await;
        }

        self.coordinator.purge_campaign_keys(campaign_id).await?;
        tracing::info!(campaign_id = %campaign_id, "Campaign purged");
        Ok(())
    }

    /// Cascade delete: contacts first, then the campaign row
    pub async fn delete(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        if campaign.status == CampaignStatus::Active {
            return Err(DialerError::Core(outdial_core::Error::Conflict(
                "pause or cancel the campaign before deleting".to_string(),
            )));
        }
        self.coordinator.purge_campaign_keys(campaign_id).await?;
        self.persistence.contacts.delete_all(campaign_id).await?;
        self.persistence.campaigns.delete(campaign_id).await?;
        Ok(())
    }

    /// Promoter handoff: a job holding a fresh pre-dial lease keyed by the
    /// pre-generated call id. Re-queues the job (and frees the slot) when
    /// the campaign stopped in between.
    pub async fn process(
        &self,
        campaign_id: Uuid,
        job_id: &str,
        origin: JobOrigin,
        call_id: String,
        pre_token: SlotToken,
    ) -> Result<(), DialerError> {
        let campaign = self.load(campaign_id).await?;
        let contact_id = Uuid::parse_str(job_id).map_err(|_| {
            DialerError::Core(outdial_core::Error::Validation(format!(
                "malformed job id {}",
                job_id
            )))
        })?;

        if campaign.status != CampaignStatus::Active {
            tracing::debug!(campaign_id = %campaign_id, job_id, "Campaign not active, re-queueing job");
            self.waitlist
                .push_front(campaign_id, job_id, origin, campaign.settings.priority_mode)
                .await?;
            let _ = self
                .slots
                .release(campaign_id, &call_id, &pre_token, true, false)
                .await?;
            return Ok(());
        }

        self.persistence
            .contacts
            .set_status(campaign_id, contact_id, ContactStatus::Calling)
            .await?;
        self.persistence
            .campaigns
            .increment(campaign_id, CounterField::QueuedCalls, -1)
            .await?;
        self.persistence
            .campaigns
            .increment(campaign_id, CounterField::ActiveCalls, 1)
            .await?;

        match self
            .orchestrator
            .dial(campaign_id, contact_id, call_id, &pre_token)
            .await
        {
            Ok(session) => {
                tracing::debug!(
                    campaign_id = %campaign_id,
                    contact_id = %contact_id,
                    session_id = %session.session_id,
                    "Dial dispatched"
                );
                Ok(())
            },
            Err(e) => {
                // dial() already released the slot and settled the contact
                tracing::warn!(campaign_id = %campaign_id, contact_id = %contact_id, "Dial failed: {}", e);
                Err(e)
            },
        }
    }
}
