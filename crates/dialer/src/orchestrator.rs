//! Per-call orchestrator
//!
//! Owns CallSession records and the per-call state machine: dials through
//! the telephony gateway, applies status webhooks idempotently, upgrades
//! the pre-dial lease on connect, and runs the release cascade on terminal
//! transitions (active token, then pre-dial token, then force-release).

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use outdial_core::{
    CallSession, CallStatus, ReleaseOutcome, SlotToken, UpgradeOutcome,
};
use outdial_coordination::SlotManager;
use outdial_persistence::PersistenceLayer;
use outdial_telephony::{
    CredentialCipher, GatewayClient, PlaceCallRequest, StatusWebhook, TelephonyError,
};

use crate::settle::{CallOutcome, ContactSettler};
use crate::DialerError;

/// Metadata keys carrying lease tokens on the call session
const META_PRE_TOKEN: &str = "pre_token";
const META_ACTIVE_TOKEN: &str = "active_token";

/// Outcome of applying one webhook, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookApplied {
    /// Status advanced
    Advanced,
    /// Redelivery or out-of-order; no effect
    Ignored,
    /// No session matched the payload
    Unmatched,
}

/// Call orchestrator handle
#[derive(Clone)]
pub struct CallOrchestrator {
    persistence: PersistenceLayer,
    slots: SlotManager,
    gateway: GatewayClient,
    cipher: CredentialCipher,
    settler: ContactSettler,
    /// Externally reachable base for the status callback URL
    public_base_url: String,
}

impl CallOrchestrator {
    pub fn new(
        persistence: PersistenceLayer,
        slots: SlotManager,
        gateway: GatewayClient,
        cipher: CredentialCipher,
        settler: ContactSettler,
        public_base_url: String,
    ) -> Self {
        Self {
            persistence,
            slots,
            gateway,
            cipher,
            settler,
            public_base_url,
        }
    }

    fn status_callback_url(&self) -> String {
        format!("{}/webhooks/telephony/status", self.public_base_url)
    }

    /// Dial a contact holding a pre-dial lease. The lease was acquired
    /// under `call_id`, which becomes the session id so upgrade and
    /// release address the same lease key. On gateway failure the session
    /// is marked failed, the slot force-released, and the contact settled
    /// per retry policy.
    pub async fn dial(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
        call_id: String,
        pre_token: &SlotToken,
    ) -> Result<CallSession, DialerError> {
        let campaign = self
            .persistence
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!(
                    "campaign {}",
                    campaign_id
                )))
            })?;
        let contact = self
            .persistence
            .contacts
            .get(campaign_id, contact_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!(
                    "contact {}",
                    contact_id
                )))
            })?;
        let phone_id = campaign.phone_id.ok_or_else(|| {
            DialerError::Core(outdial_core::Error::Validation(
                "campaign has no outbound phone".to_string(),
            ))
        })?;
        let phone = self
            .persistence
            .profiles
            .get_phone(phone_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!("phone {}", phone_id)))
            })?;

        let mut session = CallSession::new_outbound(
            campaign.user_id,
            campaign_id,
            contact_id,
            campaign.agent_id,
            phone_id,
        );
        session.session_id = call_id;
        session.metadata = serde_json::json!({
            META_PRE_TOKEN: pre_token.as_str(),
            "campaign_id": campaign_id.to_string(),
        });

        self.persistence
            .calls
            .create(&session, &phone.number, &contact.phone)
            .await?;

        let credentials = self.cipher.decrypt_phone(&phone).map_err(|e| {
            DialerError::Telephony(format!("credential decrypt: {}", e))
        })?;

        let request = PlaceCallRequest {
            from: phone.number.clone(),
            to: contact.phone.clone(),
            caller_id: phone.number.clone(),
            status_callback: self.status_callback_url(),
            custom_field: session.session_id.clone(),
        };

        match self.gateway.place_call(&credentials, &request).await {
            Ok(placed) => {
                self.persistence
                    .calls
                    .bind_external_id(&session.session_id, &placed.sid)
                    .await?;
                self.persistence
                    .calls
                    .set_initiated(&session.session_id)
                    .await?;
                self.persistence
                    .calls
                    .apply_status(
                        &session.session_id,
                        CallStatus::Ringing,
                        Some(outdial_core::OutboundStatus::Ringing),
                        None,
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await?;
                session.external_call_id = Some(placed.sid);
                session.status = CallStatus::Ringing;
                metrics::counter!("calls_dialed").increment(1);
                Ok(session)
            },
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    to = %contact.phone,
                    "Dial failed: {}",
                    e
                );
                let reason = match &e {
                    TelephonyError::Rejected { status, .. } => format!("gateway {}", status),
                    other => other.to_string(),
                };
                self.persistence
                    .calls
                    .apply_status(
                        &session.session_id,
                        CallStatus::Failed,
                        None,
                        None,
                        Some(Utc::now()),
                        None,
                        None,
                        None,
                        Some(&reason),
                    )
                    .await?;
                self.persistence
                    .calls
                    .close_open_session(campaign_id, &session.session_id)
                    .await?;
                self.slots
                    .force_release(campaign_id, &session.session_id, true)
                    .await?;

                // Permanent gateway rejections (bad credentials, disabled
                // account) are never retried
                let outcome = if e.is_permanent() {
                    CallOutcome::PermanentFailure
                } else {
                    CallOutcome::Failed
                };
                let _ = self
                    .settler
                    .settle(campaign_id, contact_id, outcome, Some(&reason))
                    .await;

                Err(e.into())
            },
        }
    }

    /// Apply one status webhook. Redelivered and reordered payloads are
    /// no-ops; callers always answer the provider with success.
    pub async fn apply_webhook(
        &self,
        payload: &StatusWebhook,
    ) -> Result<WebhookApplied, DialerError> {
        let session = self
            .persistence
            .calls
            .resolve_for_webhook(
                payload.call_sid.as_deref(),
                payload.custom_field.as_deref(),
                payload.call_from.as_deref().unwrap_or(""),
                payload.call_to.as_deref().unwrap_or(""),
            )
            .await?;

        let Some(session) = session else {
            tracing::warn!(
                call_sid = ?payload.call_sid,
                "Webhook matched no call session"
            );
            return Ok(WebhookApplied::Unmatched);
        };

        let target = payload.status.to_call_status();
        if target.rank() <= session.status.rank() {
            return Ok(WebhookApplied::Ignored);
        }

        // Late external-id binding for sessions resolved by custom field
        if session.external_call_id.is_none() {
            if let Some(ref sid) = payload.call_sid {
                let _ = self
                    .persistence
                    .calls
                    .bind_external_id(&session.session_id, sid)
                    .await;
            }
        }

        let campaign_id = session.campaign_id;

        if target == CallStatus::InProgress {
            self.on_connected(&session).await?;
        }

        let (started_at, ended_at) = if target.is_terminal() {
            (session.started_at, Some(Utc::now()))
        } else if target == CallStatus::InProgress {
            (Some(Utc::now()), None)
        } else {
            (session.started_at, None)
        };

        self.persistence
            .calls
            .apply_status(
                &session.session_id,
                target,
                payload.status.to_outbound_status().or(session.outbound_status),
                started_at,
                ended_at,
                payload.duration.or(session.duration_sec),
                payload.recording_url.as_deref(),
                payload.digits.as_deref(),
                session.failure_reason.as_deref(),
            )
            .await?;

        if target.is_terminal() {
            self.on_terminal(&session, target, session.failure_reason.as_deref())
                .await?;
        }

        tracing::debug!(
            session_id = %session.session_id,
            from = session.status.as_str(),
            to = target.as_str(),
            campaign_id = ?campaign_id,
            "Webhook applied"
        );
        Ok(WebhookApplied::Advanced)
    }

    /// First transition into in-progress: upgrade the pre-dial lease
    async fn on_connected(&self, session: &CallSession) -> Result<(), DialerError> {
        let Some(campaign_id) = session.campaign_id else {
            return Ok(());
        };
        let Some(pre_token) = session.metadata.get(META_PRE_TOKEN).and_then(|v| v.as_str())
        else {
            tracing::warn!(session_id = %session.session_id, "Connected without pre-dial token");
            return Ok(());
        };

        match self
            .slots
            .upgrade(
                campaign_id,
                &session.session_id,
                &SlotToken(pre_token.to_string()),
            )
            .await?
        {
            UpgradeOutcome::Granted { token } => {
                let mut metadata = session.metadata.clone();
                metadata[META_ACTIVE_TOKEN] = serde_json::Value::String(token.0);
                self.persistence
                    .calls
                    .set_metadata(&session.session_id, &metadata)
                    .await?;
            },
            UpgradeOutcome::Stale => {
                // Pre-dial TTL expired before connect; hold the slot via
                // force-path accounting and let the janitor reconcile
                tracing::warn!(
                    session_id = %session.session_id,
                    "Stale pre-dial token on connect"
                );
            },
        }
        Ok(())
    }

    /// Terminal transition: release cascade, counters, settlement
    async fn on_terminal(
        &self,
        session: &CallSession,
        target: CallStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), DialerError> {
        let Some(campaign_id) = session.campaign_id else {
            return Ok(());
        };

        self.persistence
            .calls
            .close_open_session(campaign_id, &session.session_id)
            .await?;

        self.release_cascade(campaign_id, session).await?;

        if let Some(contact_id) = session.contact_id {
            let outcome = CallOutcome::from_terminal(target, failure_reason);
            let _ = self
                .settler
                .settle(campaign_id, contact_id, outcome, failure_reason)
                .await;
        }

        Ok(())
    }

    /// Active token first, then pre-dial token, then force-release. The
    /// active lease is canonical when both exist.
    async fn release_cascade(
        &self,
        campaign_id: Uuid,
        session: &CallSession,
    ) -> Result<(), DialerError> {
        let active = session
            .metadata
            .get(META_ACTIVE_TOKEN)
            .and_then(|v| v.as_str());
        if let Some(token) = active {
            let released = self
                .slots
                .release(
                    campaign_id,
                    &session.session_id,
                    &SlotToken(token.to_string()),
                    false,
                    true,
                )
                .await?;
            if released.released() {
                return Ok(());
            }
        }

        let pre = session.metadata.get(META_PRE_TOKEN).and_then(|v| v.as_str());
        if let Some(token) = pre {
            let released = self
                .slots
                .release(
                    campaign_id,
                    &session.session_id,
                    &SlotToken(token.to_string()),
                    true,
                    true,
                )
                .await?;
            if matches!(released, ReleaseOutcome::Released) {
                return Ok(());
            }
        }

        self.slots
            .force_release(campaign_id, &session.session_id, true)
            .await?;
        Ok(())
    }

    /// User-initiated hangup; legal only in ringing or in-progress
    pub async fn hangup(&self, session_id: &str) -> Result<(), DialerError> {
        let session = self
            .persistence
            .calls
            .get(session_id)
            .await?
            .ok_or_else(|| {
                DialerError::Core(outdial_core::Error::NotFound(format!(
                    "call {}",
                    session_id
                )))
            })?;

        if !matches!(session.status, CallStatus::Ringing | CallStatus::InProgress) {
            return Err(DialerError::Core(outdial_core::Error::IllegalTransition {
                from: session.status.as_str().to_string(),
                to: CallStatus::UserEnded.as_str().to_string(),
            }));
        }

        if let (Some(phone_id), Some(external)) = (session.phone_id, &session.external_call_id) {
            if let Some(phone) = self.persistence.profiles.get_phone(phone_id).await? {
                let credentials = self
                    .cipher
                    .decrypt_phone(&phone)
                    .map_err(|e| DialerError::Telephony(e.to_string()))?;
                if let Err(e) = self.gateway.hangup(&credentials, external).await {
                    tracing::warn!(session_id, "Gateway hangup failed: {}", e);
                }
            }
        }

        self.apply_terminal(&session, CallStatus::UserEnded, None).await
    }

    /// Idempotent terminal marker shared by the voice session's stream
    /// close and the stuck-call monitor
    async fn apply_terminal(
        &self,
        session: &CallSession,
        status: CallStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), DialerError> {
        if session.status.is_terminal() {
            return Ok(());
        }

        self.persistence
            .calls
            .apply_status(
                &session.session_id,
                status,
                session.outbound_status,
                session.started_at,
                Some(Utc::now()),
                session.duration_sec,
                session.recording_url.as_deref(),
                session.digits.as_deref(),
                failure_reason,
            )
            .await?;

        self.on_terminal(session, status, failure_reason).await
    }

    /// Terminal entry point for monitors, by session id
    pub async fn force_terminal(
        &self,
        session_id: &str,
        status: CallStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), DialerError> {
        let Some(session) = self.persistence.calls.get(session_id).await? else {
            return Ok(());
        };
        self.apply_terminal(&session, status, failure_reason).await
    }
}

#[async_trait]
impl outdial_session::CallTerminator for CallOrchestrator {
    async fn mark_ended(
        &self,
        session_id: &str,
        status: CallStatus,
        failure_reason: Option<&str>,
    ) {
        if let Err(e) = self.force_terminal(session_id, status, failure_reason).await {
            tracing::warn!(session_id, "mark_ended failed: {}", e);
        }
    }
}
