use chrono::{DateTime, TimeZone};

use crate::error::LinkError;
use crate::store::BinaryImageLink;

/// Shortest allowed link lifetime, in seconds.
pub const MIN_TTL_SECONDS: i64 = 300;

/// Longest allowed link lifetime, in seconds.
pub const MAX_TTL_SECONDS: i64 = 30_000;

/// Lifetimes must be a multiple of this, in seconds.
pub const TTL_STEP_SECONDS: i64 = 300;

/// Check a requested lifetime: within [300, 30000] and a multiple of 300.
pub fn validate_ttl(ttl_seconds: i64) -> Result<i64, LinkError> {
    let in_range = (MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&ttl_seconds);
    if !in_range || ttl_seconds % TTL_STEP_SECONDS != 0 {
        return Err(LinkError::InvalidTtl {
            ttl: ttl_seconds,
            min: MIN_TTL_SECONDS,
            max: MAX_TTL_SECONDS,
            step: TTL_STEP_SECONDS,
        });
    }
    Ok(ttl_seconds)
}

/// Lifecycle of a link. A deleted link is simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// `now <= expiration`
    Active,
    /// `now > expiration`, eligible for the sweep
    Expired,
}

/// State of `link` at `now`. Both instants are brought into the offset the
/// expiration was stored with before comparing.
pub fn link_state<Tz: TimeZone>(link: &BinaryImageLink, now: &DateTime<Tz>) -> LinkState {
    let now = now.with_timezone(link.expiration.offset());
    if now > link.expiration {
        LinkState::Expired
    } else {
        LinkState::Active
    }
}
