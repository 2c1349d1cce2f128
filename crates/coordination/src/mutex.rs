//! Short-TTL promotion mutex
//!
//! Serializes waitlist promotion per campaign. Acquire is SET NX PX; the
//! TTL bounds holder crashes. Release is token-checked so an expired holder
//! cannot delete a successor's lock.

use redis::AsyncCommands;
use uuid::Uuid;

use crate::client::Coordinator;
use crate::{keys, scripts, CoordinationError};

/// Guard over a held promote mutex. Dropping without `release` leaves the
/// key to expire on its own.
pub struct MutexGuard {
    campaign: Uuid,
    token: String,
}

/// Per-campaign promotion mutex
#[derive(Clone)]
pub struct PromoteMutex {
    coordinator: Coordinator,
    ttl_ms: u64,
}

impl PromoteMutex {
    pub fn new(coordinator: Coordinator, ttl_secs: u64) -> Self {
        Self {
            coordinator,
            ttl_ms: ttl_secs * 1000,
        }
    }

    /// Try to take the mutex; `None` means another promoter holds it
    pub async fn try_lock(&self, campaign: Uuid) -> Result<Option<MutexGuard>, CoordinationError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.coordinator.connection();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(keys::promote_mutex(campaign))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await?;

        if acquired.is_some() {
            Ok(Some(MutexGuard { campaign, token }))
        } else {
            Ok(None)
        }
    }

    /// Release if still held by this guard
    pub async fn release(&self, guard: MutexGuard) -> Result<(), CoordinationError> {
        let mut conn = self.coordinator.connection();
        let _: i64 = scripts::RELEASE_MUTEX
            .key(keys::promote_mutex(guard.campaign))
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Extend a held mutex, for promotion loops that outlast the TTL
    pub async fn extend(&self, guard: &MutexGuard) -> Result<bool, CoordinationError> {
        let mut conn = self.coordinator.connection();
        let current: Option<String> = conn.get(keys::promote_mutex(guard.campaign)).await?;
        if current.as_deref() == Some(&guard.token) {
            let _: bool = conn
                .pexpire(keys::promote_mutex(guard.campaign), self.ttl_ms as i64)
                .await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
