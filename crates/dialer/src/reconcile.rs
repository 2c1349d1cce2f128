//! Reconciliation loops
//!
//! Background repair for every kind of lost state:
//! - lease janitor: force-releases leases whose call is gone or ancient
//! - waitlist reconciler: restores missing markers, re-pushes due retries
//! - ledger reconciler: re-pushes promoter reservations that never became
//!   leases
//! - stuck-call monitor: fails non-terminal calls older than a threshold
//! - invariant monitor: alerts on lease-over-limit and counter drift
//! - scheduler: starts due scheduled campaigns, refreshes paused flags
//!
//! Each loop is an interval task stopped through a shared watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use outdial_core::{CallStatus, CampaignStatus, ContactStatus, JobOrigin, PriorityMode};
use outdial_coordination::{Coordinator, SlotManager, Waitlist};
use outdial_persistence::PersistenceLayer;

use crate::dispatcher::CampaignDispatcher;
use crate::orchestrator::CallOrchestrator;

/// Cadence and thresholds
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub waitlist_scan_interval: Duration,
    pub waitlist_scan_batch: usize,
    pub max_call_age: Duration,
    pub pre_dial_ttl: Duration,
    pub scheduler_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            waitlist_scan_interval: Duration::from_secs(300),
            waitlist_scan_batch: 500,
            max_call_age: Duration::from_secs(7200),
            pre_dial_ttl: Duration::from_secs(60),
            scheduler_interval: Duration::from_secs(30),
        }
    }
}

/// Everything the loops need
#[derive(Clone)]
pub struct ReconcilerDeps {
    pub persistence: PersistenceLayer,
    pub coordinator: Coordinator,
    pub slots: SlotManager,
    pub waitlist: Waitlist,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub orchestrator: Arc<CallOrchestrator>,
    pub config: ReconcilerConfig,
}

/// Shutdown handle for all spawned loops
pub struct ReconcilerHandles {
    shutdown_tx: watch::Sender<bool>,
}

impl ReconcilerHandles {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Spawn every reconciliation loop
pub fn spawn_reconcilers(deps: ReconcilerDeps) -> ReconcilerHandles {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    spawn_loop(
        "lease-janitor",
        deps.config.waitlist_scan_interval,
        shutdown_rx.clone(),
        deps.clone(),
        |deps| async move { lease_janitor(&deps).await },
    );
    spawn_loop(
        "waitlist-reconciler",
        deps.config.waitlist_scan_interval,
        shutdown_rx.clone(),
        deps.clone(),
        |deps| async move { waitlist_reconciler(&deps).await },
    );
    spawn_loop(
        "ledger-reconciler",
        deps.config.pre_dial_ttl,
        shutdown_rx.clone(),
        deps.clone(),
        |deps| async move { ledger_reconciler(&deps).await },
    );
    spawn_loop(
        "stuck-call-monitor",
        deps.config.waitlist_scan_interval,
        shutdown_rx.clone(),
        deps.clone(),
        |deps| async move { stuck_call_monitor(&deps).await },
    );
    spawn_loop(
        "invariant-monitor",
        deps.config.waitlist_scan_interval,
        shutdown_rx.clone(),
        deps.clone(),
        |deps| async move { invariant_monitor(&deps).await },
    );
    spawn_loop(
        "scheduler",
        deps.config.scheduler_interval,
        shutdown_rx,
        deps,
        |deps| async move { scheduler_tick(&deps).await },
    );

    ReconcilerHandles { shutdown_tx }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    deps: ReconcilerDeps,
    body: F,
) where
    F: Fn(ReconcilerDeps) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    body(deps.clone()).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("{} shutting down", name);
                        break;
                    }
                }
            }
        }
    });
}

async fn running_campaigns(deps: &ReconcilerDeps) -> Vec<outdial_core::Campaign> {
    let mut campaigns = Vec::new();
    for status in [CampaignStatus::Active, CampaignStatus::Paused] {
        match deps.persistence.campaigns.list_by_status(status).await {
            Ok(batch) => campaigns.extend(batch),
            Err(e) => tracing::warn!("Campaign listing failed: {}", e),
        }
    }
    campaigns
}

/// Force-release leases whose call session is terminal, missing, or older
/// than the maximum call duration
async fn lease_janitor(deps: &ReconcilerDeps) {
    for campaign in running_campaigns(deps).await {
        let members = match deps.slots.lease_members(campaign.id).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(campaign_id = %campaign.id, "Lease listing failed: {}", e);
                continue;
            },
        };

        for member in members {
            let call_id = member.strip_prefix("pre-").unwrap_or(&member).to_string();
            let should_release = match deps.persistence.calls.get(&call_id).await {
                Ok(Some(session)) => {
                    session.status.is_terminal()
                        || Utc::now() - session.created_at
                            > chrono::Duration::from_std(deps.config.max_call_age)
                                .unwrap_or_else(|_| chrono::Duration::hours(2))
                },
                Ok(None) => true,
                Err(e) => {
                    tracing::warn!(call_id = %call_id, "Session lookup failed: {}", e);
                    false
                },
            };

            if should_release {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    call_id = %call_id,
                    "Janitor releasing leaked lease"
                );
                metrics::counter!("leases_janitored").increment(1);
                let _ = deps.slots.force_release(campaign.id, &call_id, true).await;
            }
        }
    }
}

/// Restore markers for queued jobs and re-push retry contacts whose delay
/// elapsed
async fn waitlist_reconciler(deps: &ReconcilerDeps) {
    for campaign in running_campaigns(deps).await {
        if campaign.status != CampaignStatus::Active {
            continue;
        }

        // Marker repair over the head of each tier
        for origin in [JobOrigin::High, JobOrigin::Normal] {
            let jobs = match deps
                .waitlist
                .peek(campaign.id, origin, deps.config.waitlist_scan_batch)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!(campaign_id = %campaign.id, "Waitlist peek failed: {}", e);
                    continue;
                },
            };
            for job in jobs {
                match deps.waitlist.has_marker(campaign.id, &job).await {
                    Ok(false) => {
                        tracing::debug!(campaign_id = %campaign.id, job = %job, "Restoring marker");
                        let _ = deps.waitlist.refresh_marker(campaign.id, &job).await;
                    },
                    Ok(true) => {},
                    Err(e) => tracing::warn!("Marker check failed: {}", e),
                }
            }
        }

        // Due retries go back onto the waitlist
        let pending = match deps
            .persistence
            .contacts
            .list_by_status(campaign.id, ContactStatus::Pending)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(campaign_id = %campaign.id, "Pending listing failed: {}", e);
                continue;
            },
        };

        for contact in pending {
            let due = contact
                .next_retry_at
                .map(|t| t <= Utc::now())
                .unwrap_or(false);
            if !due {
                continue;
            }
            let origin = match campaign.settings.priority_mode {
                PriorityMode::Priority if contact.priority > 0 => JobOrigin::High,
                _ => JobOrigin::Normal,
            };
            if deps
                .waitlist
                .push(campaign.id, &contact.id.to_string(), origin)
                .await
                .is_ok()
            {
                let _ = deps
                    .persistence
                    .contacts
                    .set_status(campaign.id, contact.id, ContactStatus::Queued)
                    .await;
                let _ = deps.coordinator.publish_slot_available(campaign.id).await;
                tracing::debug!(
                    campaign_id = %campaign.id,
                    contact_id = %contact.id,
                    "Retry re-enqueued"
                );
            }
        }
    }
}

/// Re-push promoter reservations older than the pre-dial TTL; a crash
/// between pop and lease leaves these orphaned
async fn ledger_reconciler(deps: &ReconcilerDeps) {
    for campaign in running_campaigns(deps).await {
        let cutoff = (Utc::now().timestamp_millis() as u64)
            .saturating_sub(deps.config.pre_dial_ttl.as_millis() as u64);

        let stale = match deps.waitlist.stale_reservations(campaign.id, cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(campaign_id = %campaign.id, "Ledger scan failed: {}", e);
                continue;
            },
        };

        for entry in stale {
            tracing::warn!(
                campaign_id = %campaign.id,
                job_id = %entry.job_id,
                "Re-pushing orphaned reservation"
            );
            metrics::counter!("ledger_repushed").increment(1);
            let _ = deps
                .waitlist
                .push_front(
                    campaign.id,
                    &entry.job_id,
                    entry.origin,
                    campaign.settings.priority_mode,
                )
                .await;
            let _ = deps
                .waitlist
                .unreserve(campaign.id, &entry.job_id, entry.origin)
                .await;
            let _ = deps.coordinator.publish_slot_available(campaign.id).await;
        }
    }
}

/// Fail calls stuck in non-terminal states and recover their slots
async fn stuck_call_monitor(deps: &ReconcilerDeps) {
    let threshold = chrono::Duration::from_std(deps.config.max_call_age)
        .unwrap_or_else(|_| chrono::Duration::hours(2));

    for campaign in running_campaigns(deps).await {
        let open = match deps.persistence.calls.open_sessions(campaign.id).await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!(campaign_id = %campaign.id, "Open-session scan failed: {}", e);
                continue;
            },
        };

        for (session_id, created_at) in open {
            if Utc::now() - created_at <= threshold {
                continue;
            }
            tracing::warn!(
                campaign_id = %campaign.id,
                session_id = %session_id,
                "Failing stuck call"
            );
            metrics::counter!("stuck_calls_failed").increment(1);
            let _ = deps
                .orchestrator
                .force_terminal(&session_id, CallStatus::Failed, Some("stuck"))
                .await;
        }
    }
}

/// Alert on lease counts above the limit and counter drift
async fn invariant_monitor(deps: &ReconcilerDeps) {
    for campaign in running_campaigns(deps).await {
        let counts = match deps.slots.counts(campaign.id).await {
            Ok(counts) => counts,
            Err(_) => continue,
        };
        let limit = deps
            .slots
            .get_limit(campaign.id)
            .await
            .ok()
            .flatten()
            .unwrap_or(campaign.settings.concurrent_limit);

        if counts.total() > limit as u64 {
            tracing::error!(
                campaign_id = %campaign.id,
                pre_dial = counts.pre_dial,
                active = counts.active,
                limit,
                "INVARIANT VIOLATION: leases above limit"
            );
            metrics::counter!("invariant_violations", "kind" => "lease_over_limit").increment(1);
        }

        if let Ok(counters) = deps.persistence.campaigns.counters(campaign.id).await {
            let accounted = counters.queued_calls
                + counters.active_calls
                + counters.completed_calls
                + counters.failed_calls
                + counters.voicemail_calls;
            if accounted > counters.total_contacts {
                tracing::error!(
                    campaign_id = %campaign.id,
                    accounted,
                    total = counters.total_contacts,
                    "INVARIANT VIOLATION: counters above total contacts"
                );
                metrics::counter!("invariant_violations", "kind" => "counter_drift").increment(1);
            }
        }
    }
}

/// Start due scheduled campaigns and refresh paused flags
async fn scheduler_tick(deps: &ReconcilerDeps) {
    match deps
        .persistence
        .campaigns
        .list_by_status(CampaignStatus::Scheduled)
        .await
    {
        Ok(scheduled) => {
            for campaign in scheduled {
                let due = campaign
                    .scheduled_at
                    .map(|t| t <= Utc::now())
                    .unwrap_or(false);
                if due {
                    tracing::info!(campaign_id = %campaign.id, "Starting scheduled campaign");
                    if let Err(e) = deps.dispatcher.start(campaign.id).await {
                        tracing::warn!(campaign_id = %campaign.id, "Scheduled start failed: {}", e);
                        let _ = deps
                            .persistence
                            .campaigns
                            .record_error(campaign.id, &e.to_string())
                            .await;
                    }
                }
            }
        },
        Err(e) => tracing::warn!("Scheduled listing failed: {}", e),
    }

    // Keep the short-TTL paused flag alive for paused campaigns
    if let Ok(paused) = deps
        .persistence
        .campaigns
        .list_by_status(CampaignStatus::Paused)
        .await
    {
        for campaign in paused {
            let _ = deps.coordinator.set_paused(campaign.id, 300).await;
        }
    }
}
