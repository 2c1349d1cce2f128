//! Telephony status webhook
//!
//! The provider may redeliver, reorder or drop webhooks; application is
//! idempotent and the handler always answers success so the provider never
//! storms redeliveries. Internal failures are logged and repaired by the
//! reconcilers.

use axum::extract::State;
use axum::Json;

use outdial_telephony::StatusWebhook;

use crate::state::AppState;

pub async fn status_webhook(
    State(state): State<AppState>,
    payload: Result<Json<StatusWebhook>, axum::extract::rejection::JsonRejection>,
) -> Json<serde_json::Value> {
    let ok = Json(serde_json::json!({ "success": true }));

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Unparseable status webhook: {}", e);
            return ok;
        },
    };

    metrics::counter!("webhooks_received").increment(1);

    match state.orchestrator.apply_webhook(&payload).await {
        Ok(applied) => {
            tracing::debug!(?applied, status = ?payload.status, "Webhook processed");
        },
        Err(e) => {
            // Still 200: reconcilers repair whatever this left behind
            tracing::error!("Webhook application failed: {}", e);
            metrics::counter!("webhooks_failed").increment(1);
        },
    }

    ok
}
