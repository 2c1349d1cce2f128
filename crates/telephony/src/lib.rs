//! Telephony gateway integration
//!
//! - Outbound REST client for placing calls (`/Calls/connect`)
//! - Status-webhook payload model and provider status mapping
//! - Bidirectional voice-stream protocol envelopes (start/media/stop/mark)
//! - Per-phone credential encryption (AES-256-GCM, PBKDF2-SHA256)

pub mod credentials;
pub mod gateway;
pub mod stream;
pub mod webhook;

pub use credentials::{CredentialCipher, PhoneCredentials};
pub use gateway::{GatewayClient, PlaceCallRequest, PlacedCall};
pub use stream::{MediaPayload, StreamEvent};
pub use webhook::{ProviderCallStatus, StatusWebhook};

use thiserror::Error;

/// Telephony errors
#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("Gateway request failed: {0}")]
    Request(String),

    #[error("Gateway rejected call: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("Malformed stream event: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for TelephonyError {
    fn from(err: reqwest::Error) -> Self {
        TelephonyError::Request(err.to_string())
    }
}

impl From<TelephonyError> for outdial_core::Error {
    fn from(err: TelephonyError) -> Self {
        outdial_core::Error::Telephony(err.to_string())
    }
}

impl TelephonyError {
    /// Permanent failures should not be retried by dial policy
    pub fn is_permanent(&self) -> bool {
        match self {
            TelephonyError::Credentials(_) => true,
            TelephonyError::Rejected { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}
