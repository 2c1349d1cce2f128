//! Redis-backed concurrency control plane
//!
//! Owns the ephemeral coordination state of every campaign:
//!
//! ```text
//! campaign:{id}:limit                  scalar, integer
//! campaign:{id}:leases                 set of {callId, "pre-"+callId}
//! campaign:{id}:lease:<member>         hash {token, kind}, TTL on pre-dial
//! campaign:{id}:reserved               set
//! campaign:{id}:reserved:ledger        zset (score = reservedAt ms)
//! campaign:{id}:waitlist:high          list (jobId)
//! campaign:{id}:waitlist:normal        list (jobId)
//! campaign:{id}:waitlist:marker:<jid>  scalar (TTL)
//! campaign:{id}:paused                 scalar with short TTL
//! campaign:{id}:promote-mutex          scalar with TTL
//! channel campaign:{id}:slot-available pub/sub
//! ```
//!
//! Every key carries the `{campaignId}` hash tag, so multi-key Lua scripts
//! land on one cluster slot. All lease mutations happen inside server-side
//! scripts; operations on the same campaign are totally ordered, and
//! campaigns never block each other.

pub mod client;
pub mod keys;
pub mod mutex;
pub mod scripts;
pub mod slots;
pub mod waitlist;

pub use client::{Coordinator, SlotAvailable};
pub use mutex::PromoteMutex;
pub use slots::{SlotCounts, SlotManager};
pub use waitlist::{LedgerEntry, PoppedJob, Waitlist};

use thiserror::Error;

/// Coordination-store errors. Contention outcomes (denied, stale) are
/// values on the operation results, not errors.
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed coordination value: {0}")]
    Malformed(String),
}

impl From<CoordinationError> for outdial_core::Error {
    fn from(err: CoordinationError) -> Self {
        outdial_core::Error::Coordination(err.to_string())
    }
}
