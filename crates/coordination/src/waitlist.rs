//! Per-campaign waitlist: priority-ordered job queues, marker keys and the
//! reserved ledger
//!
//! Two ordered lists per campaign (high and normal). Every queued job has a
//! marker key with a TTL so the reconciler can detect entries that fell out
//! of the lists. Jobs taken by a promoter but not yet reflected as leases
//! sit in the reserved ledger (zset scored by reservation time) until the
//! promotion either lands a pre-dial lease or pushes the job back.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use outdial_core::{JobOrigin, PriorityMode};

use crate::client::Coordinator;
use crate::{keys, scripts, CoordinationError};

/// Marker TTL: long enough to outlive queue time under sustained load
const MARKER_TTL_SECS: u64 = 24 * 3600;

/// A job pulled off the waitlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoppedJob {
    pub job_id: String,
    pub origin: JobOrigin,
}

/// One reserved-ledger row
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub job_id: String,
    pub origin: JobOrigin,
    pub reserved_at_ms: f64,
}

/// Handle over the campaign waitlist keys
#[derive(Clone)]
pub struct Waitlist {
    coordinator: Coordinator,
}

impl Waitlist {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    fn conn(&self) -> ConnectionManager {
        self.coordinator.connection()
    }

    fn list_key(campaign: Uuid, origin: JobOrigin) -> String {
        match origin {
            JobOrigin::High => keys::waitlist_high(campaign),
            JobOrigin::Normal => keys::waitlist_normal(campaign),
        }
    }

    /// Append a job to the tail of its tier and set its marker
    pub async fn push(
        &self,
        campaign: Uuid,
        job_id: &str,
        origin: JobOrigin,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let _: () = conn.rpush(Self::list_key(campaign, origin), job_id).await?;
        let _: () = conn
            .set_ex(keys::waitlist_marker(campaign, job_id), 1u8, MARKER_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Return a job to the next-pop position of its tier, used when an
    /// acquire was denied mid-promotion. In FIFO mode that is the head; in
    /// LIFO mode the tail is popped next, so push there.
    pub async fn push_front(
        &self,
        campaign: Uuid,
        job_id: &str,
        origin: JobOrigin,
        mode: PriorityMode,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let key = Self::list_key(campaign, origin);
        match mode {
            PriorityMode::Lifo => {
                let _: () = conn.rpush(&key, job_id).await?;
            },
            _ => {
                let _: () = conn.lpush(&key, job_id).await?;
            },
        }
        let _: () = conn
            .set_ex(keys::waitlist_marker(campaign, job_id), 1u8, MARKER_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Pop the next job: high tier first, then normal; LIFO pops tails.
    /// When `fairness_n > 0`, every n-th pop reads the normal tier even if
    /// high is non-empty.
    pub async fn pop(
        &self,
        campaign: Uuid,
        mode: PriorityMode,
        fairness_n: u64,
    ) -> Result<Option<PoppedJob>, CoordinationError> {
        let mut conn = self.conn();

        let popped: Option<(String, String)> = scripts::POP_JOB
            .key(keys::waitlist_high(campaign))
            .key(keys::waitlist_normal(campaign))
            .key(keys::fairness_counter(campaign))
            .arg(mode.as_str())
            .arg(fairness_n)
            .invoke_async(&mut conn)
            .await?;

        match popped {
            Some((job_id, origin)) => {
                let origin = JobOrigin::parse(&origin).ok_or_else(|| {
                    CoordinationError::Malformed(format!("unknown job origin {}", origin))
                })?;
                Ok(Some(PoppedJob { job_id, origin }))
            },
            None => Ok(None),
        }
    }

    /// Queue depths (high, normal)
    pub async fn depths(&self, campaign: Uuid) -> Result<(u64, u64), CoordinationError> {
        let mut conn = self.conn();
        let high: u64 = conn.llen(keys::waitlist_high(campaign)).await?;
        let normal: u64 = conn.llen(keys::waitlist_normal(campaign)).await?;
        Ok((high, normal))
    }

    /// First `limit` jobs of a tier without removing them, for the
    /// waitlist reconciler
    pub async fn peek(
        &self,
        campaign: Uuid,
        origin: JobOrigin,
        limit: usize,
    ) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn();
        let jobs: Vec<String> = conn
            .lrange(Self::list_key(campaign, origin), 0, limit as isize - 1)
            .await?;
        Ok(jobs)
    }

    /// Restore a marker for a job still sitting in a list (reconciler)
    pub async fn refresh_marker(
        &self,
        campaign: Uuid,
        job_id: &str,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let _: () = conn
            .set_ex(keys::waitlist_marker(campaign, job_id), 1u8, MARKER_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn has_marker(&self, campaign: Uuid, job_id: &str) -> Result<bool, CoordinationError> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(keys::waitlist_marker(campaign, job_id)).await?;
        Ok(exists)
    }

    pub async fn clear_marker(&self, campaign: Uuid, job_id: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let _: () = conn.del(keys::waitlist_marker(campaign, job_id)).await?;
        Ok(())
    }

    /// Record a job as taken by a promoter but not yet leased
    pub async fn reserve(
        &self,
        campaign: Uuid,
        job_id: &str,
        origin: JobOrigin,
        now_ms: u64,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let member = format!("{}|{}", origin.as_str(), job_id);
        let _: () = conn.sadd(keys::reserved(campaign), job_id).await?;
        let _: () = conn
            .zadd(keys::reserved_ledger(campaign), member, now_ms)
            .await?;
        Ok(())
    }

    /// Drop a job from the reserved ledger once promotion resolved
    pub async fn unreserve(
        &self,
        campaign: Uuid,
        job_id: &str,
        origin: JobOrigin,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn();
        let member = format!("{}|{}", origin.as_str(), job_id);
        let _: () = conn.srem(keys::reserved(campaign), job_id).await?;
        let _: () = conn.zrem(keys::reserved_ledger(campaign), member).await?;
        Ok(())
    }

    /// Ledger rows older than `cutoff_ms`, for the ledger reconciler
    pub async fn stale_reservations(
        &self,
        campaign: Uuid,
        cutoff_ms: u64,
    ) -> Result<Vec<LedgerEntry>, CoordinationError> {
        let mut conn = self.conn();
        let rows: Vec<(String, f64)> = conn
            .zrangebyscore_withscores(keys::reserved_ledger(campaign), 0f64, cutoff_ms as f64)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (member, score) in rows {
            let Some((origin, job_id)) = member.split_once('|') else {
                tracing::warn!(member = %member, "Malformed ledger member, dropping");
                let _: () = conn.zrem(keys::reserved_ledger(campaign), &member).await?;
                continue;
            };
            let Some(origin) = JobOrigin::parse(origin) else {
                tracing::warn!(member = %member, "Unknown ledger origin, dropping");
                let _: () = conn.zrem(keys::reserved_ledger(campaign), &member).await?;
                continue;
            };
            entries.push(LedgerEntry {
                job_id: job_id.to_string(),
                origin,
                reserved_at_ms: score,
            });
        }
        Ok(entries)
    }

    /// Drop every queued job of a campaign (cancel path). Markers are
    /// cleared per job; returns the job ids that were queued.
    pub async fn drain(&self, campaign: Uuid) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn();
        let mut drained = Vec::new();
        for key in [keys::waitlist_high(campaign), keys::waitlist_normal(campaign)] {
            let jobs: Vec<String> = conn.lrange(&key, 0, -1).await?;
            if !jobs.is_empty() {
                let _: () = conn.del(&key).await?;
            }
            for job in jobs {
                let _: () = conn.del(keys::waitlist_marker(campaign, &job)).await?;
                drained.push(job);
            }
        }
        Ok(drained)
    }
}
