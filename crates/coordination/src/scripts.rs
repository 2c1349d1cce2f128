//! Server-side Lua scripts
//!
//! Each slot/waitlist verb is one script so it executes atomically with
//! respect to every other operation on the same campaign. Lease hashes are
//! addressed through a prefix argument; all derived keys carry the same
//! `{campaignId}` hash tag as the declared keys, so cluster slot
//! collocation holds.

use once_cell::sync::Lazy;
use redis::Script;

/// Prune dead members from the leases set and return {pre, active} counts.
///
/// KEYS[1] leases set
/// ARGV[1] lease key prefix
pub static COUNT_LEASES: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local pre = 0
local active = 0
local members = redis.call('SMEMBERS', KEYS[1])
for _, m in ipairs(members) do
  if redis.call('EXISTS', ARGV[1] .. m) == 1 then
    if string.sub(m, 1, 4) == 'pre-' then
      pre = pre + 1
    else
      active = active + 1
    end
  else
    redis.call('SREM', KEYS[1], m)
  end
end
return {pre, active}
"#,
    )
});

/// Insert a pre-dial lease if the campaign is under its limit.
///
/// KEYS[1] leases set, KEYS[2] limit key
/// ARGV[1] lease key prefix, ARGV[2] call id, ARGV[3] token,
/// ARGV[4] TTL millis, ARGV[5] fallback limit, ARGV[6] origin tier
///
/// Returns 1 on grant, 0 on denial.
pub static ACQUIRE_PRE_DIAL: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local live = 0
local members = redis.call('SMEMBERS', KEYS[1])
for _, m in ipairs(members) do
  if redis.call('EXISTS', ARGV[1] .. m) == 1 then
    live = live + 1
  else
    redis.call('SREM', KEYS[1], m)
  end
end
local limit = tonumber(redis.call('GET', KEYS[2]) or ARGV[5])
if live >= limit then
  return 0
end
local member = 'pre-' .. ARGV[2]
local key = ARGV[1] .. member
redis.call('HSET', key, 'token', ARGV[3], 'kind', 'pre', 'origin', ARGV[6])
redis.call('PEXPIRE', key, ARGV[4])
redis.call('SADD', KEYS[1], member)
return 1
"#,
    )
});

/// Replace a pre-dial lease with an active one iff the token matches.
///
/// KEYS[1] leases set
/// ARGV[1] lease key prefix, ARGV[2] call id, ARGV[3] presented pre token,
/// ARGV[4] new active token
///
/// Returns 1 on grant, 0 when the pre-dial token is stale or gone.
pub static UPGRADE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local pre_member = 'pre-' .. ARGV[2]
local pre_key = ARGV[1] .. pre_member
local stored = redis.call('HGET', pre_key, 'token')
if not stored or stored ~= ARGV[3] then
  return 0
end
redis.call('DEL', pre_key)
redis.call('SREM', KEYS[1], pre_member)
local key = ARGV[1] .. ARGV[2]
redis.call('HSET', key, 'token', ARGV[4], 'kind', 'active')
redis.call('PERSIST', key)
redis.call('SADD', KEYS[1], ARGV[2])
return 1
"#,
    )
});

/// Delete a lease iff the presented token matches. Token mismatch (double
/// release) is a no-op.
///
/// KEYS[1] leases set
/// ARGV[1] lease key prefix, ARGV[2] call id, ARGV[3] token,
/// ARGV[4] kind: 'pre' or 'active'
///
/// Returns 1 when released, 0 otherwise.
pub static RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local member = ARGV[2]
if ARGV[4] == 'pre' then
  member = 'pre-' .. ARGV[2]
end
local key = ARGV[1] .. member
local stored = redis.call('HGET', key, 'token')
if not stored or stored ~= ARGV[3] then
  return 0
end
redis.call('DEL', key)
redis.call('SREM', KEYS[1], member)
return 1
"#,
    )
});

/// Token-less recovery release. Active is canonical when both lease
/// flavors exist (upgrade race), so it is tried first.
///
/// KEYS[1] leases set
/// ARGV[1] lease key prefix, ARGV[2] call id
///
/// Returns 2 (active released), 1 (pre-dial released) or 0 (nothing held).
pub static FORCE_RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local akey = ARGV[1] .. ARGV[2]
if redis.call('EXISTS', akey) == 1 then
  redis.call('DEL', akey)
  redis.call('SREM', KEYS[1], ARGV[2])
  return 2
end
local pmember = 'pre-' .. ARGV[2]
local pkey = ARGV[1] .. pmember
if redis.call('EXISTS', pkey) == 1 then
  redis.call('DEL', pkey)
  redis.call('SREM', KEYS[1], pmember)
  return 1
end
redis.call('SREM', KEYS[1], ARGV[2])
redis.call('SREM', KEYS[1], pmember)
return 0
"#,
    )
});

/// Pop one job honoring tier precedence, LIFO mode and fairness rotation.
///
/// KEYS[1] high list, KEYS[2] normal list, KEYS[3] fairness counter
/// ARGV[1] mode: 'fifo' or 'lifo', ARGV[2] fairness N (0 disables)
///
/// Returns {jobId, origin} or nil when both tiers are empty.
pub static POP_JOB: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local function pop(key)
  if ARGV[1] == 'lifo' then
    return redis.call('RPOP', key)
  end
  return redis.call('LPOP', key)
end
local n = tonumber(ARGV[2])
if n > 0 and redis.call('LLEN', KEYS[2]) > 0 then
  local c = redis.call('INCR', KEYS[3])
  if c % n == 0 then
    local job = pop(KEYS[2])
    if job then
      return {job, 'N'}
    end
  end
end
local job = pop(KEYS[1])
if job then
  return {job, 'H'}
end
job = pop(KEYS[2])
if job then
  return {job, 'N'}
end
return nil
"#,
    )
});

/// Release the promote mutex iff the caller still owns it.
///
/// KEYS[1] mutex key
/// ARGV[1] owner token
pub static RELEASE_MUTEX: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_build() {
        // Script hashes are computed eagerly; a malformed script would panic
        // on first access.
        for script in [
            &*COUNT_LEASES,
            &*ACQUIRE_PRE_DIAL,
            &*UPGRADE,
            &*RELEASE,
            &*FORCE_RELEASE,
            &*POP_JOB,
            &*RELEASE_MUTEX,
        ] {
            assert!(!script.get_hash().is_empty());
        }
    }
}
