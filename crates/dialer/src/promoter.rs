//! Waitlist promoter
//!
//! Subscribed to slot-available events; serialized per campaign by the
//! promote mutex. While slots are free it pops a job, records it in the
//! reserved ledger, acquires a pre-dial lease keyed by a fresh call id,
//! and hands the pair to the dispatcher's process entry without blocking
//! the promotion loop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use outdial_core::{AcquireOutcome, CampaignStatus, PriorityMode};
use outdial_coordination::{Coordinator, PromoteMutex, SlotManager, Waitlist};
use outdial_persistence::PersistenceLayer;

use outdial_config::constants::pacing;
use outdial_config::constants::slots::FAIR_ROTATION_N;

use crate::dispatcher::CampaignDispatcher;
use crate::DialerError;

/// Per-campaign dial pacing after concurrency denials
#[derive(Debug, Clone, Copy, Default)]
struct Backoff {
    consecutive_denials: u32,
}

impl Backoff {
    fn delay(&self) -> Duration {
        if self.consecutive_denials == 0 {
            return Duration::ZERO;
        }
        let exp = self.consecutive_denials.saturating_sub(1).min(3);
        let ms = (pacing::INTER_CALL_DELAY_MS << exp).min(pacing::MAX_BACKOFF_MS);
        Duration::from_millis(ms)
    }
}

/// Waitlist promoter handle
#[derive(Clone)]
pub struct Promoter {
    coordinator: Coordinator,
    slots: SlotManager,
    waitlist: Waitlist,
    mutex: PromoteMutex,
    persistence: PersistenceLayer,
    dispatcher: Arc<CampaignDispatcher>,
    backoff: Arc<DashMap<Uuid, Backoff>>,
}

impl Promoter {
    pub fn new(
        coordinator: Coordinator,
        slots: SlotManager,
        waitlist: Waitlist,
        mutex: PromoteMutex,
        persistence: PersistenceLayer,
        dispatcher: Arc<CampaignDispatcher>,
    ) -> Self {
        Self {
            coordinator,
            slots,
            waitlist,
            mutex,
            persistence,
            dispatcher,
            backoff: Arc::new(DashMap::new()),
        }
    }

    /// Run the event loop until shutdown flips
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut events = match self.coordinator.subscribe_slot_available().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Promoter cannot subscribe to slot events: {}", e);
                return;
            },
        };
        tracing::info!("Promoter running");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            let promoter = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = promoter.promote(event.campaign_id).await {
                                    tracing::warn!(
                                        campaign_id = %event.campaign_id,
                                        "Promotion failed: {}",
                                        e
                                    );
                                }
                            });
                        },
                        None => {
                            tracing::warn!("Slot-available subscription ended");
                            break;
                        },
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Promoter shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One promotion round for a campaign
    pub async fn promote(&self, campaign_id: Uuid) -> Result<(), DialerError> {
        // Honor pacing from previous denials before contending for the mutex
        let delay = self
            .backoff
            .get(&campaign_id)
            .map(|b| b.delay())
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.coordinator.is_paused(campaign_id).await? {
            return Ok(());
        }

        let Some(campaign) = self.persistence.campaigns.get(campaign_id).await? else {
            return Ok(());
        };
        if campaign.status != CampaignStatus::Active {
            return Ok(());
        }

        // Serialize promotion per campaign
        let Some(guard) = self.mutex.try_lock(campaign_id).await? else {
            return Ok(());
        };

        let limit = self
            .slots
            .get_limit(campaign_id)
            .await?
            .unwrap_or(campaign.settings.concurrent_limit);
        let fairness_n = if campaign.settings.fair_tier_rotation {
            FAIR_ROTATION_N
        } else {
            0
        };
        let mode = campaign.settings.priority_mode;

        let mut promoted = 0u32;
        let result = self
            .promotion_loop(campaign_id, limit, mode, fairness_n, &mut promoted)
            .await;

        self.mutex.release(guard).await?;

        if promoted > 0 {
            tracing::debug!(campaign_id = %campaign_id, promoted, "Promotion round done");
            metrics::counter!("jobs_promoted").increment(promoted as u64);
        }
        result
    }

    async fn promotion_loop(
        &self,
        campaign_id: Uuid,
        limit: u32,
        mode: PriorityMode,
        fairness_n: u64,
        promoted: &mut u32,
    ) -> Result<(), DialerError> {
        loop {
            let counts = self.slots.counts(campaign_id).await?;
            if counts.total() >= limit as u64 {
                break;
            }

            let Some(job) = self.waitlist.pop(campaign_id, mode, fairness_n).await? else {
                break;
            };

            // Ledger entry covers the window between pop and lease
            let now_ms = chrono::Utc::now().timestamp_millis() as u64;
            self.waitlist
                .reserve(campaign_id, &job.job_id, job.origin, now_ms)
                .await?;

            // Lease keyed by the call id the dial will use
            let call_id = Uuid::new_v4().to_string();
            match self
                .slots
                .acquire_pre_dial(campaign_id, &call_id, limit, job.origin)
                .await?
            {
                AcquireOutcome::Granted { token } => {
                    self.waitlist
                        .unreserve(campaign_id, &job.job_id, job.origin)
                        .await?;
                    self.waitlist
                        .clear_marker(campaign_id, &job.job_id)
                        .await?;
                    self.backoff.remove(&campaign_id);

                    let dispatcher = Arc::clone(&self.dispatcher);
                    let job_id = job.job_id.clone();
                    let origin = job.origin;
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher
                            .process(campaign_id, &job_id, origin, call_id, token)
                            .await
                        {
                            tracing::warn!(
                                campaign_id = %campaign_id,
                                job_id = %job_id,
                                "Process handoff failed: {}",
                                e
                            );
                        }
                    });
                    *promoted += 1;
                },
                AcquireOutcome::Denied => {
                    // Lost the race to another worker; put the job back at
                    // the next-pop position and pace future attempts
                    self.waitlist
                        .push_front(campaign_id, &job.job_id, job.origin, mode)
                        .await?;
                    self.waitlist
                        .unreserve(campaign_id, &job.job_id, job.origin)
                        .await?;
                    self.backoff
                        .entry(campaign_id)
                        .and_modify(|b| b.consecutive_denials += 1)
                        .or_insert(Backoff {
                            consecutive_denials: 1,
                        });
                    break;
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.delay(), Duration::ZERO);

        backoff.consecutive_denials = 1;
        assert_eq!(backoff.delay(), Duration::from_millis(1000));

        backoff.consecutive_denials = 2;
        assert_eq!(backoff.delay(), Duration::from_millis(2000));

        backoff.consecutive_denials = 3;
        assert_eq!(backoff.delay(), Duration::from_millis(4000));

        // Capped at 5s
        backoff.consecutive_denials = 10;
        assert_eq!(backoff.delay(), Duration::from_millis(5000));
    }
}
