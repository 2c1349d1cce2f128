//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables. Timestamps are epoch milliseconds (BIGINT).
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Campaigns
    let campaigns_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.campaigns (
            id UUID,
            user_id UUID,
            agent_id UUID,
            phone_id UUID,
            name TEXT,
            status TEXT,
            settings_json TEXT,
            created_at BIGINT,
            updated_at BIGINT,
            scheduled_at BIGINT,
            metadata_json TEXT,
            PRIMARY KEY (id)
        )
    "#,
        keyspace
    );

    // Campaign counters; mutated only via counter increments
    let counters_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.campaign_counters (
            campaign_id UUID,
            total_contacts COUNTER,
            queued_calls COUNTER,
            active_calls COUNTER,
            completed_calls COUNTER,
            failed_calls COUNTER,
            voicemail_calls COUNTER,
            PRIMARY KEY (campaign_id)
        )
    "#,
        keyspace
    );

    // Contacts partitioned by campaign
    let contacts_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.campaign_contacts (
            campaign_id UUID,
            id UUID,
            phone TEXT,
            name TEXT,
            email TEXT,
            custom_data_json TEXT,
            status TEXT,
            retry_count INT,
            next_retry_at BIGINT,
            last_attempt_at BIGINT,
            failure_reason TEXT,
            priority INT,
            created_at BIGINT,
            PRIMARY KEY ((campaign_id), id)
        )
    "#,
        keyspace
    );

    // Phone dedup guard; inserted with IF NOT EXISTS
    let contact_phones_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.contact_phones (
            campaign_id UUID,
            phone TEXT,
            contact_id UUID,
            PRIMARY KEY ((campaign_id), phone)
        )
    "#,
        keyspace
    );

    // Call sessions keyed by the session uuid used as the gateway
    // custom field and stream key
    let calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_sessions (
            session_id TEXT,
            id UUID,
            user_id UUID,
            campaign_id UUID,
            contact_id UUID,
            agent_id UUID,
            phone_id UUID,
            direction TEXT,
            status TEXT,
            outbound_status TEXT,
            created_at BIGINT,
            initiated_at BIGINT,
            started_at BIGINT,
            ended_at BIGINT,
            duration_sec INT,
            external_call_id TEXT,
            recording_url TEXT,
            digits TEXT,
            transcript LIST<TEXT>,
            language_switches LIST<TEXT>,
            cost_json TEXT,
            retry_of UUID,
            failure_reason TEXT,
            metadata_json TEXT,
            PRIMARY KEY (session_id)
        )
    "#,
        keyspace
    );

    // Webhook lookup: provider-assigned external id -> session
    let calls_by_external_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_sessions_by_external (
            external_call_id TEXT,
            session_id TEXT,
            PRIMARY KEY (external_call_id)
        )
    "#,
        keyspace
    );

    // Webhook fallback lookup: (from, to) route, recent first
    let calls_by_route_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_sessions_by_route (
            from_number TEXT,
            to_number TEXT,
            created_at BIGINT,
            session_id TEXT,
            PRIMARY KEY ((from_number, to_number), created_at)
        ) WITH CLUSTERING ORDER BY (created_at DESC)
    "#,
        keyspace
    );

    // Non-terminal sessions index for the stuck-call monitor
    let open_calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.open_call_sessions (
            campaign_id UUID,
            session_id TEXT,
            created_at BIGINT,
            PRIMARY KEY ((campaign_id), session_id)
        )
    "#,
        keyspace
    );

    // Agent profiles
    let agents_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.agent_profiles (
            id UUID,
            user_id UUID,
            profile_json TEXT,
            PRIMARY KEY (id)
        )
    "#,
        keyspace
    );

    // Outbound phones with encrypted gateway credentials
    let phones_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.phone_profiles (
            id UUID,
            user_id UUID,
            number TEXT,
            subdomain TEXT,
            account_sid TEXT,
            app_id TEXT,
            encrypted_api_key TEXT,
            encrypted_api_token TEXT,
            PRIMARY KEY (id)
        )
    "#,
        keyspace
    );

    for (name, query) in [
        ("campaigns", campaigns_table),
        ("campaign_counters", counters_table),
        ("campaign_contacts", contacts_table),
        ("contact_phones", contact_phones_table),
        ("call_sessions", calls_table),
        ("call_sessions_by_external", calls_by_external_table),
        ("call_sessions_by_route", calls_by_route_table),
        ("open_call_sessions", open_calls_table),
        ("agent_profiles", agents_table),
        ("phone_profiles", phones_table),
    ] {
        session.query_unpaged(query, &[]).await.map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create {} table: {}", name, e))
        })?;
    }

    Ok(())
}
