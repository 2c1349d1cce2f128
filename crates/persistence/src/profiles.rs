//! Agent and phone profile lookup
//!
//! Profile CRUD lives outside this system; the dialer only needs typed
//! reads plus ownership checks. Agent profiles are stored as one JSON
//! column so option-set evolution never needs a migration.

use uuid::Uuid;

use outdial_core::{AgentProfile, PhoneProfile};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Read-side store for agent and phone profiles
#[derive(Clone)]
pub struct ProfileStore {
    client: ScyllaClient,
}

impl ProfileStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Option<AgentProfile>, PersistenceError> {
        let query = format!(
            "SELECT profile_json FROM {}.agent_profiles WHERE id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (id,)).await?;

        match result.maybe_first_row_typed::<(String,)>()? {
            Some((json,)) => {
                let profile = serde_json::from_str(&json)
                    .map_err(|e| PersistenceError::Decode(e.to_string()))?;
                Ok(Some(profile))
            },
            None => Ok(None),
        }
    }

    /// Agent profile, verifying ownership
    pub async fn get_owned_agent(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<AgentProfile, PersistenceError> {
        let profile = self
            .get_agent(id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("agent {}", id)))?;
        if profile.user_id != user_id {
            return Err(PersistenceError::NotFound(format!("agent {}", id)));
        }
        Ok(profile)
    }

    pub async fn put_agent(&self, profile: &AgentProfile) -> Result<(), PersistenceError> {
        let json =
            serde_json::to_string(profile).map_err(|e| PersistenceError::Query(e.to_string()))?;
        let query = format!(
            "INSERT INTO {}.agent_profiles (id, user_id, profile_json) VALUES (?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (profile.id, profile.user_id, json))
            .await?;
        Ok(())
    }

    pub async fn get_phone(&self, id: Uuid) -> Result<Option<PhoneProfile>, PersistenceError> {
        let query = format!(
            "SELECT id, user_id, number, subdomain, account_sid, app_id,
                    encrypted_api_key, encrypted_api_token
             FROM {}.phone_profiles WHERE id = ?",
            self.client.keyspace()
        );
        let result = self.client.session().query_unpaged(query, (id,)).await?;

        type Row = (Uuid, Uuid, String, String, String, String, String, String);
        match result.maybe_first_row_typed::<Row>()? {
            Some((id, user_id, number, subdomain, account_sid, app_id, key, token)) => {
                Ok(Some(PhoneProfile {
                    id,
                    user_id,
                    number,
                    subdomain,
                    account_sid,
                    app_id,
                    encrypted_api_key: key,
                    encrypted_api_token: token,
                }))
            },
            None => Ok(None),
        }
    }

    /// Phone profile, verifying ownership
    pub async fn get_owned_phone(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<PhoneProfile, PersistenceError> {
        let phone = self
            .get_phone(id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("phone {}", id)))?;
        if phone.user_id != user_id {
            return Err(PersistenceError::NotFound(format!("phone {}", id)));
        }
        Ok(phone)
    }

    pub async fn put_phone(&self, phone: &PhoneProfile) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.phone_profiles (id, user_id, number, subdomain, account_sid,
                    app_id, encrypted_api_key, encrypted_api_token)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    phone.id,
                    phone.user_id,
                    phone.number.as_str(),
                    phone.subdomain.as_str(),
                    phone.account_sid.as_str(),
                    phone.app_id.as_str(),
                    phone.encrypted_api_key.as_str(),
                    phone.encrypted_api_token.as_str(),
                ),
            )
            .await?;
        Ok(())
    }
}
