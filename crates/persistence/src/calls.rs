//! Call-session store
//!
//! The primary key is the session uuid (also the gateway custom field and
//! stream key). Two side tables serve webhook resolution: external call id
//! and (from, to) route. Transcript entries are appended through a
//! dedicated list-append statement so the voice session and webhook
//! handler never clobber each other's writes.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use outdial_core::{
    CallDirection, CallSession, CallStatus, CostBreakdown, LanguageSwitch, OutboundStatus,
    TranscriptEntry,
};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Webhook fallback window for (from, to) resolution
const ROUTE_WINDOW_MS: i64 = 5 * 60 * 1000;

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

const CALL_COLUMNS: &str = "session_id, id, user_id, campaign_id, contact_id, agent_id, phone_id, \
     direction, status, outbound_status, created_at, initiated_at, started_at, ended_at, \
     duration_sec, external_call_id, recording_url, digits, transcript, language_switches, \
     cost_json, retry_of, failure_reason, metadata_json";

/// Wire form of one call_sessions row. Wider than the tuple impls go, so
/// serialization is derived.
#[derive(scylla::SerializeRow, scylla::FromRow)]
struct CallRow {
    session_id: String,
    id: Uuid,
    user_id: Uuid,
    campaign_id: Option<Uuid>,
    contact_id: Option<Uuid>,
    agent_id: Uuid,
    phone_id: Option<Uuid>,
    direction: String,
    status: String,
    outbound_status: Option<String>,
    created_at: i64,
    initiated_at: Option<i64>,
    started_at: Option<i64>,
    ended_at: Option<i64>,
    duration_sec: Option<i32>,
    external_call_id: Option<String>,
    recording_url: Option<String>,
    digits: Option<String>,
    transcript: Option<Vec<String>>,
    language_switches: Option<Vec<String>>,
    cost_json: Option<String>,
    retry_of: Option<Uuid>,
    failure_reason: Option<String>,
    metadata_json: Option<String>,
}

impl CallRow {
    fn encode(session: &CallSession) -> Self {
        let transcript: Vec<String> = session
            .transcript
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect();
        let switches: Vec<String> = session
            .language_switches
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect();

        Self {
            session_id: session.session_id.clone(),
            id: session.id,
            user_id: session.user_id,
            campaign_id: session.campaign_id,
            contact_id: session.contact_id,
            agent_id: session.agent_id,
            phone_id: session.phone_id,
            direction: session.direction.as_str().to_string(),
            status: session.status.as_str().to_string(),
            outbound_status: session.outbound_status.map(|s| s.as_str().to_string()),
            created_at: millis(session.created_at),
            initiated_at: session.initiated_at.map(millis),
            started_at: session.started_at.map(millis),
            ended_at: session.ended_at.map(millis),
            duration_sec: session.duration_sec.map(|d| d as i32),
            external_call_id: session.external_call_id.clone(),
            recording_url: session.recording_url.clone(),
            digits: session.digits.clone(),
            transcript: Some(transcript),
            language_switches: Some(switches),
            cost_json: serde_json::to_string(&session.cost).ok(),
            retry_of: session.retry_of,
            failure_reason: session.failure_reason.clone(),
            metadata_json: Some(session.metadata.to_string()),
        }
    }
}

fn decode_call(row: CallRow) -> Result<CallSession, PersistenceError> {
    let CallRow {
        session_id,
        id,
        user_id,
        campaign_id,
        contact_id,
        agent_id,
        phone_id,
        direction,
        status,
        outbound_status,
        created_at,
        initiated_at,
        started_at,
        ended_at,
        duration_sec,
        external_call_id,
        recording_url,
        digits,
        transcript,
        language_switches,
        cost_json,
        retry_of,
        failure_reason,
        metadata_json,
    } = row;

    let direction = match direction.as_str() {
        "inbound" => CallDirection::Inbound,
        "outbound" => CallDirection::Outbound,
        other => {
            return Err(PersistenceError::Decode(format!(
                "unknown call direction {}",
                other
            )))
        },
    };
    let status = CallStatus::parse(&status)
        .ok_or_else(|| PersistenceError::Decode(format!("unknown call status {}", status)))?;
    let outbound_status = outbound_status.as_deref().and_then(OutboundStatus::parse);

    let transcript: Vec<TranscriptEntry> = transcript
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| serde_json::from_str(entry).ok())
        .collect();
    let language_switches: Vec<LanguageSwitch> = language_switches
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| serde_json::from_str(entry).ok())
        .collect();
    let cost: CostBreakdown = cost_json
        .and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or_default();
    let metadata = metadata_json
        .and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or_else(|| serde_json::json!({}));

    Ok(CallSession {
        id,
        session_id,
        user_id,
        campaign_id,
        contact_id,
        agent_id,
        phone_id,
        direction,
        status,
        outbound_status,
        created_at: from_millis(created_at),
        initiated_at: initiated_at.map(from_millis),
        started_at: started_at.map(from_millis),
        ended_at: ended_at.map(from_millis),
        duration_sec: duration_sec.map(|d| d.max(0) as u32),
        external_call_id,
        recording_url,
        digits,
        transcript,
        language_switches,
        cost,
        retry_of,
        failure_reason,
        metadata,
    })
}

/// Call-session record store
#[derive(Clone)]
pub struct CallSessionStore {
    client: ScyllaClient,
}

impl CallSessionStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        session: &CallSession,
        from_number: &str,
        to_number: &str,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.call_sessions ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace(),
            CALL_COLUMNS
        );

        self.client
            .session()
            .query_unpaged(query, CallRow::encode(session))
            .await?;

        // Route index for webhook fallback resolution
        let route = format!(
            "INSERT INTO {}.call_sessions_by_route (from_number, to_number, created_at, session_id)
             VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                route,
                (
                    from_number,
                    to_number,
                    millis(session.created_at),
                    session.session_id.as_str(),
                ),
            )
            .await?;

        // Open-session index for the stuck-call monitor
        if let Some(campaign_id) = session.campaign_id {
            let open = format!(
                "INSERT INTO {}.open_call_sessions (campaign_id, session_id, created_at)
                 VALUES (?, ?, ?)",
                self.client.keyspace()
            );
            self.client
                .session()
                .query_unpaged(
                    open,
                    (campaign_id, session.session_id.as_str(), millis(session.created_at)),
                )
                .await?;
        }

        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<CallSession>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {}.call_sessions WHERE session_id = ?",
            CALL_COLUMNS,
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (session_id,))
            .await?;

        match result.maybe_first_row_typed::<CallRow>()? {
            Some(row) => Ok(Some(decode_call(row)?)),
            None => Ok(None),
        }
    }

    /// Bind the provider-assigned external call id once the dial succeeds
    pub async fn bind_external_id(
        &self,
        session_id: &str,
        external_call_id: &str,
    ) -> Result<(), PersistenceError> {
        let update = format!(
            "UPDATE {}.call_sessions SET external_call_id = ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(update, (external_call_id, session_id))
            .await?;

        let index = format!(
            "INSERT INTO {}.call_sessions_by_external (external_call_id, session_id) VALUES (?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(index, (external_call_id, session_id))
            .await?;
        Ok(())
    }

    /// Webhook resolution order: external call id, then custom field
    /// (session uuid), then most recent (from, to) within five minutes.
    pub async fn resolve_for_webhook(
        &self,
        external_call_id: Option<&str>,
        custom_field: Option<&str>,
        from_number: &str,
        to_number: &str,
    ) -> Result<Option<CallSession>, PersistenceError> {
        if let Some(external) = external_call_id {
            let query = format!(
                "SELECT session_id FROM {}.call_sessions_by_external WHERE external_call_id = ?",
                self.client.keyspace()
            );
            let result = self
                .client
                .session()
                .query_unpaged(query, (external,))
                .await?;
            if let Some((session_id,)) = result.maybe_first_row_typed::<(String,)>()? {
                if let Some(session) = self.get(&session_id).await? {
                    return Ok(Some(session));
                }
            }
        }

        if let Some(custom) = custom_field {
            if let Some(session) = self.get(custom).await? {
                return Ok(Some(session));
            }
        }

        let cutoff = millis(Utc::now()) - ROUTE_WINDOW_MS;
        let query = format!(
            "SELECT session_id, created_at FROM {}.call_sessions_by_route
             WHERE from_number = ? AND to_number = ? LIMIT 5",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (from_number, to_number))
            .await?;
        for row in result.rows_typed::<(String, i64)>()? {
            let (session_id, created_at) = row?;
            if created_at >= cutoff {
                if let Some(session) = self.get(&session_id).await? {
                    return Ok(Some(session));
                }
            }
        }

        Ok(None)
    }

    /// Apply a status edge with its timestamps
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_status(
        &self,
        session_id: &str,
        status: CallStatus,
        outbound_status: Option<OutboundStatus>,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
        duration_sec: Option<u32>,
        recording_url: Option<&str>,
        digits: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_sessions SET status = ?, outbound_status = ?, started_at = ?,
                    ended_at = ?, duration_sec = ?, recording_url = ?, digits = ?, failure_reason = ?
             WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    status.as_str(),
                    outbound_status.map(|s| s.as_str()),
                    started_at.map(millis),
                    ended_at.map(millis),
                    duration_sec.map(|d| d as i32),
                    recording_url,
                    digits,
                    failure_reason,
                    session_id,
                ),
            )
            .await?;

        Ok(())
    }

    pub async fn set_initiated(&self, session_id: &str) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_sessions SET initiated_at = ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (millis(Utc::now()), session_id))
            .await?;
        Ok(())
    }

    /// Merge lease tokens and linkage into the session metadata
    pub async fn set_metadata(
        &self,
        session_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_sessions SET metadata_json = ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (metadata.to_string(), session_id))
            .await?;
        Ok(())
    }

    /// Append one transcript entry without touching the rest of the row
    pub async fn append_transcript(
        &self,
        session_id: &str,
        entry: &TranscriptEntry,
    ) -> Result<(), PersistenceError> {
        let encoded =
            serde_json::to_string(entry).map_err(|e| PersistenceError::Query(e.to_string()))?;
        let query = format!(
            "UPDATE {}.call_sessions SET transcript = transcript + ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (vec![encoded], session_id))
            .await?;
        Ok(())
    }

    pub async fn append_language_switch(
        &self,
        session_id: &str,
        switch: &LanguageSwitch,
    ) -> Result<(), PersistenceError> {
        let encoded =
            serde_json::to_string(switch).map_err(|e| PersistenceError::Query(e.to_string()))?;
        let query = format!(
            "UPDATE {}.call_sessions SET language_switches = language_switches + ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (vec![encoded], session_id))
            .await?;
        Ok(())
    }

    pub async fn update_cost(
        &self,
        session_id: &str,
        cost: &CostBreakdown,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.call_sessions SET cost_json = ? WHERE session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (serde_json::to_string(cost).ok(), session_id))
            .await?;
        Ok(())
    }

    /// Open (non-terminal) sessions of a campaign, for the stuck-call monitor
    pub async fn open_sessions(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<(String, DateTime<Utc>)>, PersistenceError> {
        let query = format!(
            "SELECT session_id, created_at FROM {}.open_call_sessions WHERE campaign_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (campaign_id,))
            .await?;

        let mut sessions = Vec::new();
        for row in result.rows_typed::<(String, i64)>()? {
            let (session_id, created_at) = row?;
            sessions.push((session_id, from_millis(created_at)));
        }
        Ok(sessions)
    }

    /// Drop a session from the open index once it reaches a terminal state
    pub async fn close_open_session(
        &self,
        campaign_id: Uuid,
        session_id: &str,
    ) -> Result<(), PersistenceError> {
        let query = format!(
            "DELETE FROM {}.open_call_sessions WHERE campaign_id = ? AND session_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (campaign_id, session_id))
            .await?;
        Ok(())
    }
}
