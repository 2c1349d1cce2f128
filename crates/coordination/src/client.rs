//! Redis connection management and slot-available pub/sub

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::keys;
use crate::CoordinationError;

/// Notification that a slot may have opened on a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAvailable {
    pub campaign_id: Uuid,
}

/// Shared handle to the coordination store
#[derive(Clone)]
pub struct Coordinator {
    client: redis::Client,
    manager: ConnectionManager,
}

impl Coordinator {
    /// Connect to Redis and build the managed connection
    pub async fn connect(url: &str) -> Result<Self, CoordinationError> {
        tracing::info!(url = %url, "Connecting to coordination store");
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, manager })
    }

    /// A cloned multiplexed connection for command execution
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Publish slot availability for a campaign
    pub async fn publish_slot_available(&self, campaign: Uuid) -> Result<(), CoordinationError> {
        let mut conn = self.connection();
        let channel = keys::slot_available_channel(campaign);
        let _: () = conn.publish(&channel, campaign.to_string()).await?;
        Ok(())
    }

    /// Subscribe to slot-available events across all campaigns.
    ///
    /// Spawns a pub/sub pump; the returned receiver yields one event per
    /// published message. The pump exits when the receiver is dropped.
    pub async fn subscribe_slot_available(
        &self,
    ) -> Result<mpsc::Receiver<SlotAvailable>, CoordinationError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(keys::SLOT_AVAILABLE_PATTERN).await?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let Some(campaign_id) = keys::campaign_from_channel(&channel) else {
                    tracing::warn!(channel = %channel, "Unparseable slot-available channel");
                    continue;
                };
                if tx.send(SlotAvailable { campaign_id }).await.is_err() {
                    break;
                }
            }
            tracing::info!("Slot-available subscription closed");
        });

        Ok(rx)
    }

    /// Mark a campaign paused; the promoter skips paused campaigns
    pub async fn set_paused(&self, campaign: Uuid, ttl_secs: u64) -> Result<(), CoordinationError> {
        let mut conn = self.connection();
        let _: () = conn.set_ex(keys::paused(campaign), 1u8, ttl_secs).await?;
        Ok(())
    }

    pub async fn clear_paused(&self, campaign: Uuid) -> Result<(), CoordinationError> {
        let mut conn = self.connection();
        let _: () = conn.del(keys::paused(campaign)).await?;
        Ok(())
    }

    pub async fn is_paused(&self, campaign: Uuid) -> Result<bool, CoordinationError> {
        let mut conn = self.connection();
        let exists: bool = conn.exists(keys::paused(campaign)).await?;
        Ok(exists)
    }

    /// Enqueue a completed call session for the async summarizer
    pub async fn enqueue_for_summary(&self, session_id: &str) -> Result<(), CoordinationError> {
        let mut conn = self.connection();
        let _: () = conn.rpush("summarize:pending", session_id).await?;
        Ok(())
    }

    /// Delete every coordination key of a campaign. SCAN-based so it is
    /// safe on clusters; the `{campaignId}` hash tag keeps the pattern on
    /// one slot.
    pub async fn purge_campaign_keys(&self, campaign: Uuid) -> Result<u64, CoordinationError> {
        let mut conn = self.connection();
        let pattern = keys::campaign_pattern(campaign);

        let mut deleted = 0u64;
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !batch.is_empty() {
                let removed: u64 = conn.del(&batch).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::info!(campaign_id = %campaign, deleted, "Purged coordination keys");
        Ok(deleted)
    }
}
