//! Distributed per-campaign slot manager
//!
//! Two-phase reservation: a pre-dial lease (short TTL) is taken before the
//! gateway dial, then upgraded to an active lease (no TTL) when the call
//! connects. The pre-dial TTL is the safety net for dials that never
//! happen; active leases depend on explicit release by the orchestrator,
//! the webhook handler, or the janitor's force-release.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use outdial_core::{AcquireOutcome, ForceReleased, ReleaseOutcome, SlotToken, UpgradeOutcome};

use crate::client::Coordinator;
use crate::{keys, scripts, CoordinationError};

/// Live lease counts for one campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotCounts {
    pub pre_dial: u64,
    pub active: u64,
}

impl SlotCounts {
    pub fn total(&self) -> u64 {
        self.pre_dial + self.active
    }
}

/// Handle over the campaign lease keys
#[derive(Clone)]
pub struct SlotManager {
    coordinator: Coordinator,
    pre_dial_ttl_ms: u64,
}

impl SlotManager {
    pub fn new(coordinator: Coordinator, pre_dial_ttl_secs: u64) -> Self {
        Self {
            coordinator,
            pre_dial_ttl_ms: pre_dial_ttl_secs * 1000,
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.coordinator.connection()
    }

    /// Atomically reserve a pre-dial slot if the campaign is under `limit`.
    /// Tie-breaking among concurrent acquires is whatever order the scripts
    /// serialize in; fair over many rounds.
    pub async fn acquire_pre_dial(
        &self,
        campaign: Uuid,
        call_id: &str,
        limit: u32,
        origin: outdial_core::JobOrigin,
    ) -> Result<AcquireOutcome, CoordinationError> {
        let token = SlotToken::generate();
        let mut conn = self.conn();

        let granted: i64 = scripts::ACQUIRE_PRE_DIAL
            .key(keys::leases(campaign))
            .key(keys::limit(campaign))
            .arg(keys::lease_prefix(campaign))
            .arg(call_id)
            .arg(token.as_str())
            .arg(self.pre_dial_ttl_ms)
            .arg(limit)
            .arg(origin.as_str())
            .invoke_async(&mut conn)
            .await?;

        if granted == 1 {
            tracing::debug!(campaign_id = %campaign, call_id, "Pre-dial slot granted");
            Ok(AcquireOutcome::Granted { token })
        } else {
            Ok(AcquireOutcome::Denied)
        }
    }

    /// Promote a pre-dial lease to an active lease. Stale tokens are
    /// rejected without side effects.
    pub async fn upgrade(
        &self,
        campaign: Uuid,
        call_id: &str,
        pre_token: &SlotToken,
    ) -> Result<UpgradeOutcome, CoordinationError> {
        let active_token = SlotToken::generate();
        let mut conn = self.conn();

        let granted: i64 = scripts::UPGRADE
            .key(keys::leases(campaign))
            .arg(keys::lease_prefix(campaign))
            .arg(call_id)
            .arg(pre_token.as_str())
            .arg(active_token.as_str())
            .invoke_async(&mut conn)
            .await?;

        if granted == 1 {
            tracing::debug!(campaign_id = %campaign, call_id, "Lease upgraded to active");
            Ok(UpgradeOutcome::Granted {
                token: active_token,
            })
        } else {
            Ok(UpgradeOutcome::Stale)
        }
    }

    /// Delete the matching lease iff the supplied token matches. Publishes
    /// slot availability when requested and the release actually happened.
    pub async fn release(
        &self,
        campaign: Uuid,
        call_id: &str,
        token: &SlotToken,
        is_pre_dial: bool,
        publish: bool,
    ) -> Result<ReleaseOutcome, CoordinationError> {
        let mut conn = self.conn();

        let released: i64 = scripts::RELEASE
            .key(keys::leases(campaign))
            .arg(keys::lease_prefix(campaign))
            .arg(call_id)
            .arg(token.as_str())
            .arg(if is_pre_dial { "pre" } else { "active" })
            .invoke_async(&mut conn)
            .await?;

        if released == 1 {
            if publish {
                self.coordinator.publish_slot_available(campaign).await?;
            }
            Ok(ReleaseOutcome::Released)
        } else {
            Ok(ReleaseOutcome::NotReleased)
        }
    }

    /// Token-less recovery release used when the original token is unknown
    /// (webhook after restart, janitor). Prefers active over pre-dial.
    pub async fn force_release(
        &self,
        campaign: Uuid,
        call_id: &str,
        publish: bool,
    ) -> Result<ForceReleased, CoordinationError> {
        let mut conn = self.conn();

        let released: i64 = scripts::FORCE_RELEASE
            .key(keys::leases(campaign))
            .arg(keys::lease_prefix(campaign))
            .arg(call_id)
            .invoke_async(&mut conn)
            .await?;

        let outcome = match released {
            2 => ForceReleased::Active,
            1 => ForceReleased::PreDial,
            _ => ForceReleased::None,
        };

        if !matches!(outcome, ForceReleased::None) && publish {
            self.coordinator.publish_slot_available(campaign).await?;
        }

        Ok(outcome)
    }

    /// Live pre-dial and active counts; prunes expired members as a side
    /// effect.
    pub async fn counts(&self, campaign: Uuid) -> Result<SlotCounts, CoordinationError> {
        let mut conn = self.conn();

        let counts: Vec<i64> = scripts::COUNT_LEASES
            .key(keys::leases(campaign))
            .arg(keys::lease_prefix(campaign))
            .invoke_async(&mut conn)
            .await?;

        if counts.len() != 2 {
            return Err(CoordinationError::Malformed(format!(
                "lease count script returned {} values",
                counts.len()
            )));
        }

        Ok(SlotCounts {
            pre_dial: counts[0].max(0) as u64,
            active: counts[1].max(0) as u64,
        })
    }

    /// Active-lease count only
    pub async fn active_count(&self, campaign: Uuid) -> Result<u64, CoordinationError> {
        Ok(self.counts(campaign).await?.active)
    }

    pub async fn set_limit(&self, campaign: Uuid, limit: u32) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let _: () = conn.set(keys::limit(campaign), limit).await?;
        Ok(())
    }

    pub async fn get_limit(&self, campaign: Uuid) -> Result<Option<u32>, CoordinationError> {
        let mut conn = self.conn();
        let limit: Option<u32> = conn.get(keys::limit(campaign)).await?;
        Ok(limit)
    }

    /// List call ids holding leases, for the janitor's age checks
    pub async fn lease_members(&self, campaign: Uuid) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(keys::leases(campaign)).await?;
        Ok(members)
    }
}
