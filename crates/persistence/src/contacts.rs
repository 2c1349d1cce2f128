//! Campaign contact store
//!
//! (campaign_id, phone) uniqueness is enforced through a guard table
//! inserted with IF NOT EXISTS; the contact row itself is keyed by
//! (campaign_id, contact_id).

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use outdial_core::{validate_phone, CampaignContact, ContactStatus};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Outcome of a bulk contact insert
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BulkAddReport {
    pub added: u64,
    pub duplicates: u64,
    pub errors: Vec<String>,
}

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

type ContactRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    i32,
    Option<i64>,
    Option<i64>,
    Option<String>,
    i32,
    i64,
);

fn decode_contact(row: ContactRow) -> Result<CampaignContact, PersistenceError> {
    let (
        campaign_id,
        id,
        phone,
        name,
        email,
        custom_data_json,
        status,
        retry_count,
        next_retry_at,
        last_attempt_at,
        failure_reason,
        priority,
        created_at,
    ) = row;

    let status = ContactStatus::parse(&status)
        .ok_or_else(|| PersistenceError::Decode(format!("unknown contact status {}", status)))?;

    Ok(CampaignContact {
        id,
        campaign_id,
        phone,
        name,
        email,
        custom_data: custom_data_json.and_then(|j| serde_json::from_str(&j).ok()),
        status,
        retry_count: retry_count.max(0) as u32,
        next_retry_at: next_retry_at.map(from_millis),
        last_attempt_at: last_attempt_at.map(from_millis),
        failure_reason,
        priority,
        created_at: from_millis(created_at),
    })
}

const CONTACT_COLUMNS: &str = "campaign_id, id, phone, name, email, custom_data_json, status, \
     retry_count, next_retry_at, last_attempt_at, failure_reason, priority, created_at";

/// Contact record store
#[derive(Clone)]
pub struct ContactStore {
    client: ScyllaClient,
}

impl ContactStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    /// Insert one contact, enforcing phone uniqueness within the campaign.
    /// Returns false when the phone was already present.
    pub async fn insert(&self, contact: &CampaignContact) -> Result<bool, PersistenceError> {
        let guard = format!(
            "INSERT INTO {}.contact_phones (campaign_id, phone, contact_id)
             VALUES (?, ?, ?) IF NOT EXISTS",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(guard, (contact.campaign_id, contact.phone.as_str(), contact.id))
            .await?;

        // LWT result row: [applied] first; on conflict the existing row's
        // columns follow, so only the first column is read
        let applied = result
            .rows()
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|value| value.as_boolean())
            .unwrap_or(false);

        if !applied {
            return Ok(false);
        }

        let query = format!(
            "INSERT INTO {}.campaign_contacts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace(),
            CONTACT_COLUMNS
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    contact.campaign_id,
                    contact.id,
                    contact.phone.as_str(),
                    contact.name.as_deref(),
                    contact.email.as_deref(),
                    contact.custom_data.as_ref().map(|c| c.to_string()),
                    contact.status.as_str(),
                    contact.retry_count as i32,
                    contact.next_retry_at.map(millis),
                    contact.last_attempt_at.map(millis),
                    contact.failure_reason.as_deref(),
                    contact.priority,
                    millis(contact.created_at),
                ),
            )
            .await?;

        Ok(true)
    }

    /// Bulk insert rows, deduplicating on phone and validating E.164
    pub async fn bulk_insert(
        &self,
        contacts: Vec<CampaignContact>,
    ) -> Result<BulkAddReport, PersistenceError> {
        let mut report = BulkAddReport::default();

        for contact in contacts {
            if let Err(e) = validate_phone(&contact.phone) {
                report.errors.push(format!("{}: {}", contact.phone, e));
                continue;
            }
            match self.insert(&contact).await {
                Ok(true) => report.added += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => report.errors.push(format!("{}: {}", contact.phone, e)),
            }
        }

        Ok(report)
    }

    pub async fn get(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<CampaignContact>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.campaign_contacts WHERE campaign_id = ? AND id = ?",
            CONTACT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (campaign_id, contact_id))
            .await?;

        match result.maybe_first_row_typed::<ContactRow>()? {
            Some(row) => Ok(Some(decode_contact(row)?)),
            None => Ok(None),
        }
    }

    /// All contacts of a campaign (single partition scan)
    pub async fn list(&self, campaign_id: Uuid) -> Result<Vec<CampaignContact>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.campaign_contacts WHERE campaign_id = ?",
            CONTACT_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (campaign_id,))
            .await?;

        let mut contacts = Vec::new();
        for row in result.rows_typed::<ContactRow>()? {
            contacts.push(decode_contact(row?)?);
        }
        Ok(contacts)
    }

    /// Contacts currently in `status`
    pub async fn list_by_status(
        &self,
        campaign_id: Uuid,
        status: ContactStatus,
    ) -> Result<Vec<CampaignContact>, PersistenceError> {
        Ok(self
            .list(campaign_id)
            .await?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }

    pub async fn set_status(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
        status: ContactStatus,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.campaign_contacts SET status = ? WHERE campaign_id = ? AND id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (status.as_str(), campaign_id, contact_id))
            .await?;
        Ok(())
    }

    /// Record a dial attempt outcome on the contact row
    pub async fn record_attempt(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
        status: ContactStatus,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
        failure_reason: Option<&str>,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.campaign_contacts
             SET status = ?, retry_count = ?, next_retry_at = ?, last_attempt_at = ?, failure_reason = ?
             WHERE campaign_id = ? AND id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    status.as_str(),
                    retry_count as i32,
                    next_retry_at.map(millis),
                    millis(Utc::now()),
                    failure_reason,
                    campaign_id,
                    contact_id,
                ),
            )
            .await?;
        Ok(())
    }

    /// Remove all contacts of a campaign (cascade before campaign delete)
    pub async fn delete_all(&self, campaign_id: Uuid) -> Result<(), PersistenceError> {
        for table in ["campaign_contacts", "contact_phones"] {
            let query = format!(
                "DELETE FROM {}.{} WHERE campaign_id = ?",
                self.client.keyspace(),
                table
            );
            self.client
                .session()
                .query_unpaged(query, (campaign_id,))
                .await?;
        }
        Ok(())
    }
}
