//! ScyllaDB persistence layer for the campaign dialer
//!
//! Provides durable storage for:
//! - Campaigns and their counter table
//! - Campaign contacts (deduplicated on (campaign, phone))
//! - Call sessions (transcripts, webhook lookup indexes)
//! - Agent and phone profiles

pub mod calls;
pub mod campaigns;
pub mod client;
pub mod contacts;
pub mod error;
pub mod profiles;
pub mod schema;

pub use calls::CallSessionStore;
pub use campaigns::{CampaignStore, CounterField};
pub use client::{ScyllaClient, ScyllaConfig};
pub use contacts::{BulkAddReport, ContactStore};
pub use error::PersistenceError;
pub use profiles::ProfileStore;

/// Initialize the persistence layer: connect, ensure schema, build stores
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        campaigns: CampaignStore::new(client.clone()),
        contacts: ContactStore::new(client.clone()),
        calls: CallSessionStore::new(client.clone()),
        profiles: ProfileStore::new(client),
    })
}

/// Combined persistence layer with all stores
#[derive(Clone)]
pub struct PersistenceLayer {
    pub campaigns: CampaignStore,
    pub contacts: ContactStore,
    pub calls: CallSessionStore,
    pub profiles: ProfileStore,
}
