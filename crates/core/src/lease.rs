//! Concurrency lease tokens and tagged slot-operation outcomes
//!
//! A slot is held in two phases: a pre-dial lease with a short TTL taken
//! before the gateway is called, upgraded to an active lease (no TTL) when
//! the call connects. Contention outcomes are values, not errors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque lease token; release requires presenting the matching token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotToken(pub String);

impl SlotToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lease phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseKind {
    Pre,
    Active,
}

impl LeaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseKind::Pre => "pre",
            LeaseKind::Active => "active",
        }
    }
}

/// Which waitlist tier a reserved job came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOrigin {
    High,
    Normal,
}

impl JobOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOrigin::High => "H",
            JobOrigin::Normal => "N",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "H" => Some(JobOrigin::High),
            "N" => Some(JobOrigin::Normal),
            _ => None,
        }
    }
}

/// Outcome of `acquire_pre_dial`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted { token: SlotToken },
    /// Campaign is at its concurrency limit; never surfaced to the user
    Denied,
}

/// Outcome of `upgrade`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Granted { token: SlotToken },
    /// Presented pre-dial token no longer matches; re-read and retry
    Stale,
}

/// Outcome of a token-checked `release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Token mismatch or lease already gone; treated as a no-op
    NotReleased,
}

impl ReleaseOutcome {
    pub fn released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

/// Outcome of token-less `force_release`; active is preferred over pre-dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReleased {
    None,
    PreDial,
    Active,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(SlotToken::generate(), SlotToken::generate());
    }

    #[test]
    fn test_origin_round_trip() {
        assert_eq!(JobOrigin::parse("H"), Some(JobOrigin::High));
        assert_eq!(JobOrigin::parse("N"), Some(JobOrigin::Normal));
        assert_eq!(JobOrigin::parse("X"), None);
        assert_eq!(JobOrigin::High.as_str(), "H");
    }
}
