//! Campaign dialer server
//!
//! Provides the campaign HTTP API, the telephony status webhook, the
//! call-flow endpoint, and the bidirectional voice-stream websocket.

pub mod http;
pub mod metrics;
pub mod state;
pub mod voicestream;
pub mod webhook;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// API error wrapper mapping domain errors onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub outdial_core::Error);

impl From<outdial_core::Error> for ApiError {
    fn from(err: outdial_core::Error) -> Self {
        ApiError(err)
    }
}

impl From<outdial_dialer::DialerError> for ApiError {
    fn from(err: outdial_dialer::DialerError) -> Self {
        ApiError(err.into())
    }
}

impl From<outdial_persistence::PersistenceError> for ApiError {
    fn from(err: outdial_persistence::PersistenceError) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        use outdial_core::Error::*;
        match &self.0 {
            Validation(_) => StatusCode::BAD_REQUEST,
            Forbidden(_) => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) | IllegalTransition { .. } => StatusCode::CONFLICT,
            NearSaturation { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {}", self.0);
        }
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
