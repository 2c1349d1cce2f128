//! Campaign dialer
//!
//! The control plane gluing campaigns to calls:
//! - `dispatcher`: campaign lifecycle (start/pause/resume/cancel/purge),
//!   bulk contact enqueue, limit changes, the promoter handoff entry
//! - `promoter`: pulls waitlisted jobs into execution when slots open
//! - `orchestrator`: per-call dial, webhook application, release cascade
//! - `settle`: the retry-policy table deciding a contact's fate from a
//!   call outcome, plus campaign counter edges
//! - `reconcile`: background repair loops (janitor, waitlist, ledger,
//!   stuck calls, invariants, scheduler)

pub mod dispatcher;
pub mod orchestrator;
pub mod promoter;
pub mod reconcile;
pub mod settle;

pub use dispatcher::{CampaignDispatcher, ContactRow};
pub use orchestrator::{CallOrchestrator, WebhookApplied};
pub use promoter::Promoter;
pub use reconcile::{spawn_reconcilers, ReconcilerConfig, ReconcilerDeps, ReconcilerHandles};
pub use settle::{CallOutcome, ContactSettler};

use thiserror::Error;

/// Dialer errors
#[derive(Error, Debug)]
pub enum DialerError {
    #[error(transparent)]
    Core(#[from] outdial_core::Error),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Telephony error: {0}")]
    Telephony(String),
}

impl From<outdial_coordination::CoordinationError> for DialerError {
    fn from(err: outdial_coordination::CoordinationError) -> Self {
        DialerError::Coordination(err.to_string())
    }
}

impl From<outdial_persistence::PersistenceError> for DialerError {
    fn from(err: outdial_persistence::PersistenceError) -> Self {
        match err {
            outdial_persistence::PersistenceError::NotFound(what) => {
                DialerError::Core(outdial_core::Error::NotFound(what))
            },
            other => DialerError::Persistence(other.to_string()),
        }
    }
}

impl From<outdial_telephony::TelephonyError> for DialerError {
    fn from(err: outdial_telephony::TelephonyError) -> Self {
        DialerError::Telephony(err.to_string())
    }
}

impl From<DialerError> for outdial_core::Error {
    fn from(err: DialerError) -> Self {
        match err {
            DialerError::Core(core) => core,
            DialerError::Coordination(msg) => outdial_core::Error::Coordination(msg),
            DialerError::Persistence(msg) => outdial_core::Error::Persistence(msg),
            DialerError::Telephony(msg) => outdial_core::Error::Telephony(msg),
        }
    }
}
