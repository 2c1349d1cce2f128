//! HTTP endpoints
//!
//! Campaign REST API plus health, readiness and metrics.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use outdial_core::{CampaignSettings, Error as CoreError};
use outdial_dialer::ContactRow;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::voicestream::{call_flow, ws_handler};
use crate::webhook::status_webhook;
use crate::ApiError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        // Campaign API
        .route("/campaigns", post(create_campaign))
        .route("/campaigns", get(list_campaigns))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id", patch(update_campaign))
        .route("/campaigns/:id", delete(delete_campaign))
        .route("/campaigns/:id/contacts", post(add_contacts))
        .route("/campaigns/:id/start", post(start_campaign))
        .route("/campaigns/:id/pause", post(pause_campaign))
        .route("/campaigns/:id/resume", post(resume_campaign))
        .route("/campaigns/:id/cancel", post(cancel_campaign))
        .route("/campaigns/:id/retry", post(retry_campaign))
        .route("/campaigns/:id/concurrent-limit", patch(set_limit))
        .route("/campaigns/:id/purge", delete(purge_campaign))
        .route("/campaigns/:id/stats", get(campaign_stats))
        .route("/campaigns/:id/progress", get(campaign_progress))
        // Call control
        .route("/calls/:session_id/hangup", post(hangup_call))
        // Telephony integration
        .route("/webhooks/telephony/status", post(status_webhook))
        .route("/voice-flow/:session_id", get(call_flow))
        .route("/voice/:session_id", get(ws_handler))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS from configured origins; permissive only when disabled
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

/// Caller identity. Authentication lives in front of this service; the
/// trusted proxy injects the user id.
fn user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| ApiError(CoreError::Validation("missing x-user-id header".to_string())))
}

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    name: String,
    agent_id: Uuid,
    #[serde(default)]
    phone_id: Option<Uuid>,
    #[serde(default)]
    settings: Option<CampaignSettings>,
    #[serde(default)]
    scheduled_at: Option<DateTime<Utc>>,
}

async fn create_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let campaign = state
        .dispatcher
        .create(
            user_id,
            request.agent_id,
            request.phone_id,
            request.name,
            request.settings.unwrap_or_default(),
            request.scheduled_at,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn list_campaigns(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let campaigns = state.persistence.campaigns.list_for_user(user_id).await?;
    let count = campaigns.len();
    Ok(Json(serde_json::json!({
        "campaigns": campaigns,
        "count": count,
    })))
}

/// Load a campaign and verify ownership
async fn owned_campaign(
    state: &AppState,
    headers: &HeaderMap,
    id: Uuid,
) -> Result<outdial_core::Campaign, ApiError> {
    let user_id = user_id(headers)?;
    let campaign = state
        .persistence
        .campaigns
        .get(id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("campaign {}", id))))?;
    if campaign.user_id != user_id {
        return Err(ApiError(CoreError::Forbidden(format!("campaign {}", id))));
    }
    Ok(campaign)
}

async fn get_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = owned_campaign(&state, &headers, id).await?;
    Ok(Json(campaign))
}

#[derive(Debug, Deserialize)]
struct UpdateCampaignRequest {
    #[serde(default)]
    settings: Option<CampaignSettings>,
}

async fn update_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = owned_campaign(&state, &headers, id).await?;
    if let Some(settings) = request.settings {
        settings.validate().map_err(ApiError)?;
        if campaign.status.is_terminal() {
            return Err(ApiError(CoreError::Conflict(
                "campaign is finished".to_string(),
            )));
        }
        state
            .persistence
            .campaigns
            .update_settings(id, &settings)
            .await?;
    }
    let updated = state
        .persistence
        .campaigns
        .get(id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("campaign {}", id))))?;
    Ok(Json(updated))
}

async fn delete_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AddContactsRequest {
    contacts: Vec<ContactRow>,
}

async fn add_contacts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<AddContactsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    let report = state.dispatcher.add_contacts(id, request.contacts).await?;
    Ok(Json(report))
}

async fn start_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.start(id).await?;
    Ok(Json(serde_json::json!({ "status": "active" })))
}

async fn pause_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.pause(id).await?;
    Ok(Json(serde_json::json!({ "status": "paused" })))
}

async fn resume_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.resume(id).await?;
    Ok(Json(serde_json::json!({ "status": "active" })))
}

async fn cancel_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.cancel(id).await?;
    Ok(Json(serde_json::json!({ "status": "cancelled" })))
}

async fn retry_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    let requeued = state.dispatcher.retry_failed(id).await?;
    Ok(Json(serde_json::json!({ "requeued": requeued })))
}

#[derive(Debug, Deserialize)]
struct LimitRequest {
    limit: u32,
}

async fn set_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<LimitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.set_concurrent_limit(id, request.limit).await?;
    Ok(Json(serde_json::json!({ "limit": request.limit })))
}

async fn purge_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_campaign(&state, &headers, id).await?;
    state.dispatcher.purge(id).await?;
    Ok(Json(serde_json::json!({ "purged": true })))
}

async fn campaign_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = owned_campaign(&state, &headers, id).await?;
    let counts = state
        .slots
        .counts(id)
        .await
        .map_err(|e| ApiError(e.into()))?;

    Ok(Json(serde_json::json!({
        "status": campaign.status,
        "counters": campaign.counters,
        "slots": {
            "pre_dial": counts.pre_dial,
            "active": counts.active,
            "limit": campaign.settings.concurrent_limit,
        },
    })))
}

async fn campaign_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = owned_campaign(&state, &headers, id).await?;
    let counters = &campaign.counters;

    Ok(Json(serde_json::json!({
        "status": campaign.status,
        "total": counters.total_contacts,
        "settled": counters.settled(),
        "progress": counters.progress(),
        "breakdown": {
            "queued": counters.queued_calls,
            "active": counters.active_calls,
            "completed": counters.completed_calls,
            "failed": counters.failed_calls,
            "voicemail": counters.voicemail_calls,
        },
    })))
}

async fn hangup_call(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.hangup(&session_id).await?;
    Ok(Json(serde_json::json!({ "status": "user-ended" })))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    // Redis reachability is the liveness-critical dependency: without it
    // dispatch halts (active calls continue)
    let coordination_ok = state
        .slots
        .get_limit(Uuid::nil())
        .await
        .is_ok();

    let status = if coordination_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "coordination": coordination_ok,
            "live_sessions": state.registry.count(),
        })),
    )
}
