//! Coordination-store key builders
//!
//! The `{campaignId}` hash tag keeps every key of a campaign on one cluster
//! slot, which the multi-key Lua scripts rely on.

use uuid::Uuid;

pub fn limit(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:limit", campaign)
}

pub fn leases(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:leases", campaign)
}

/// Prefix for individual lease hashes; member name is appended in-script
pub fn lease_prefix(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:lease:", campaign)
}

pub fn reserved(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:reserved", campaign)
}

pub fn reserved_ledger(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:reserved:ledger", campaign)
}

pub fn waitlist_high(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:waitlist:high", campaign)
}

pub fn waitlist_normal(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:waitlist:normal", campaign)
}

pub fn waitlist_marker(campaign: Uuid, job_id: &str) -> String {
    format!("campaign:{{{}}}:waitlist:marker:{}", campaign, job_id)
}

pub fn fairness_counter(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:waitlist:fairness", campaign)
}

pub fn paused(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:paused", campaign)
}

pub fn promote_mutex(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:promote-mutex", campaign)
}

pub fn slot_available_channel(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:slot-available", campaign)
}

/// Pattern matching every coordination key of a campaign, for purge scans
pub fn campaign_pattern(campaign: Uuid) -> String {
    format!("campaign:{{{}}}:*", campaign)
}

/// Pattern matching every slot-available channel, for the promoter's psubscribe
pub const SLOT_AVAILABLE_PATTERN: &str = "campaign:*:slot-available";

/// Extract the campaign id from a slot-available channel name
pub fn campaign_from_channel(channel: &str) -> Option<Uuid> {
    let inner = channel.strip_prefix("campaign:{")?;
    let (id, rest) = inner.split_once('}')?;
    if rest != ":slot-available" {
        return None;
    }
    Uuid::parse_str(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_tag_shared_across_keys() {
        let id = Uuid::new_v4();
        let tag = format!("{{{}}}", id);
        for key in [
            limit(id),
            leases(id),
            lease_prefix(id),
            reserved(id),
            reserved_ledger(id),
            waitlist_high(id),
            waitlist_normal(id),
            waitlist_marker(id, "job-1"),
            paused(id),
            promote_mutex(id),
            slot_available_channel(id),
        ] {
            assert!(key.contains(&tag), "{} missing hash tag", key);
        }
    }

    #[test]
    fn test_channel_round_trip() {
        let id = Uuid::new_v4();
        let channel = slot_available_channel(id);
        assert_eq!(campaign_from_channel(&channel), Some(id));

        assert_eq!(campaign_from_channel("campaign:{bad}:slot-available"), None);
        assert_eq!(campaign_from_channel("other:{x}:slot-available"), None);
    }
}
