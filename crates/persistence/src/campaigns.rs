//! Campaign store and counter table

use chrono::{DateTime, TimeZone, Utc};
use scylla::frame::value::Counter;
use uuid::Uuid;

use outdial_core::{Campaign, CampaignCounters, CampaignSettings, CampaignStatus};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Which campaign counter to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    TotalContacts,
    QueuedCalls,
    ActiveCalls,
    CompletedCalls,
    FailedCalls,
    VoicemailCalls,
}

impl CounterField {
    fn column(&self) -> &'static str {
        match self {
            CounterField::TotalContacts => "total_contacts",
            CounterField::QueuedCalls => "queued_calls",
            CounterField::ActiveCalls => "active_calls",
            CounterField::CompletedCalls => "completed_calls",
            CounterField::FailedCalls => "failed_calls",
            CounterField::VoicemailCalls => "voicemail_calls",
        }
    }
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Campaign record store
#[derive(Clone)]
pub struct CampaignStore {
    client: ScyllaClient,
}

impl CampaignStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, campaign: &Campaign) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.campaigns (
                id, user_id, agent_id, phone_id, name, status, settings_json,
                created_at, updated_at, scheduled_at, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        let settings_json = serde_json::to_string(&campaign.settings)
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let metadata_json = campaign
            .metadata
            .as_ref()
            .map(|m| m.to_string());

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    campaign.id,
                    campaign.user_id,
                    campaign.agent_id,
                    campaign.phone_id,
                    campaign.name.as_str(),
                    campaign.status.as_str(),
                    settings_json,
                    millis(campaign.created_at),
                    millis(campaign.updated_at),
                    campaign.scheduled_at.map(millis),
                    metadata_json,
                ),
            )
            .await?;

        tracing::debug!(campaign_id = %campaign.id, "Campaign persisted");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Campaign>, PersistenceError> {
        let query = format!(
            "SELECT id, user_id, agent_id, phone_id, name, status, settings_json,
                    created_at, updated_at, scheduled_at, metadata_json
             FROM {}.campaigns WHERE id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id,)).await?;

        type Row = (
            Uuid,
            Uuid,
            Uuid,
            Option<Uuid>,
            String,
            String,
            String,
            i64,
            i64,
            Option<i64>,
            Option<String>,
        );

        let Some(row) = result.maybe_first_row_typed::<Row>()? else {
            return Ok(None);
        };

        let (
            id,
            user_id,
            agent_id,
            phone_id,
            name,
            status,
            settings_json,
            created_at,
            updated_at,
            scheduled_at,
            metadata_json,
        ) = row;

        let status = CampaignStatus::parse(&status)
            .ok_or_else(|| PersistenceError::Decode(format!("unknown campaign status {}", status)))?;
        let settings: CampaignSettings = serde_json::from_str(&settings_json)
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;
        let metadata = metadata_json.and_then(|m| serde_json::from_str(&m).ok());

        let counters = self.counters(id).await?;

        Ok(Some(Campaign {
            id,
            user_id,
            agent_id,
            phone_id,
            name,
            status,
            settings,
            counters,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
            scheduled_at: scheduled_at.map(from_millis),
            metadata,
        }))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Campaign>, PersistenceError> {
        // Small-cardinality admin listing; a dedicated index would replace
        // ALLOW FILTERING at real scale.
        let query = format!(
            "SELECT id FROM {}.campaigns WHERE user_id = ? ALLOW FILTERING",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await?;

        let mut campaigns = Vec::new();
        for row in result.rows_typed::<(Uuid,)>()? {
            let (id,) = row?;
            if let Some(campaign) = self.get(id).await? {
                campaigns.push(campaign);
            }
        }
        Ok(campaigns)
    }

    /// Campaigns currently in a given status, for the scheduler and monitors
    pub async fn list_by_status(
        &self,
        status: CampaignStatus,
    ) -> Result<Vec<Campaign>, PersistenceError> {
        let query = format!(
            "SELECT id FROM {}.campaigns WHERE status = ? ALLOW FILTERING",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (status.as_str(),))
            .await?;

        let mut campaigns = Vec::new();
        for row in result.rows_typed::<(Uuid,)>()? {
            let (id,) = row?;
            if let Some(campaign) = self.get(id).await? {
                campaigns.push(campaign);
            }
        }
        Ok(campaigns)
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.campaigns SET status = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (status.as_str(), millis(Utc::now()), id))
            .await?;
        Ok(())
    }

    pub async fn update_settings(
        &self,
        id: Uuid,
        settings: &CampaignSettings,
    ) -> Result<(), PersistenceError> {
        let settings_json =
            serde_json::to_string(settings).map_err(|e| PersistenceError::Query(e.to_string()))?;
        let query = format!(
            "UPDATE {}.campaigns SET settings_json = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (settings_json, millis(Utc::now()), id))
            .await?;
        Ok(())
    }

    /// Record a campaign-level error without failing the campaign
    pub async fn record_error(&self, id: Uuid, error: &str) -> Result<(), PersistenceError> {
        let metadata = serde_json::json!({
            "last_error": error,
            "last_error_at": Utc::now().to_rfc3339(),
        })
        .to_string();
        let query = format!(
            "UPDATE {}.campaigns SET metadata_json = ?, updated_at = ? WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (metadata, millis(Utc::now()), id))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PersistenceError> {
        for table in ["campaigns", "campaign_counters"] {
            let query = format!(
                "DELETE FROM {}.{} WHERE {} = ?",
                self.client.keyspace(),
                table,
                if table == "campaigns" { "id" } else { "campaign_id" }
            );
            self.client.session().query_unpaged(query, (id,)).await?;
        }
        Ok(())
    }

    /// Monotonic counter increment
    pub async fn increment(
        &self,
        id: Uuid,
        field: CounterField,
        delta: i64,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.campaign_counters SET {} = {} + ? WHERE campaign_id = ?",
            self.client.keyspace(),
            field.column(),
            field.column()
        );
        self.client
            .session()
            .query_unpaged(query, (Counter(delta), id))
            .await?;
        Ok(())
    }

    pub async fn counters(&self, id: Uuid) -> Result<CampaignCounters, PersistenceError> {
        let query = format!(
            "SELECT total_contacts, queued_calls, active_calls, completed_calls,
                    failed_calls, voicemail_calls
             FROM {}.campaign_counters WHERE campaign_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id,)).await?;

        type Row = (
            Option<Counter>,
            Option<Counter>,
            Option<Counter>,
            Option<Counter>,
            Option<Counter>,
            Option<Counter>,
        );

        let Some(row) = result.maybe_first_row_typed::<Row>()? else {
            return Ok(CampaignCounters::default());
        };

        let value = |c: Option<Counter>| c.map(|Counter(v)| v.max(0) as u64).unwrap_or(0);

        Ok(CampaignCounters {
            total_contacts: value(row.0),
            queued_calls: value(row.1),
            active_calls: value(row.2),
            completed_calls: value(row.3),
            failed_calls: value(row.4),
            voicemail_calls: value(row.5),
        })
    }
}
