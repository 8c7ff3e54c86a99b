//! Wall-clock access and time zone handling.
//!
//! Link creation reads "now" from a [`Clock`] on every call. Expiration
//! timestamps are stored in the configured zone and compared as typed instants
//! after normalizing both sides into that zone.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};

use crate::error::ConfigError;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant. Must be evaluated on every call.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock whose time only moves when told to. Used by tests and tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(start.with_timezone(&Utc)),
        }
    }

    /// Move the clock to an absolute instant.
    pub fn set<Tz: TimeZone>(&self, instant: DateTime<Tz>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant.with_timezone(&Utc);
        }
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += Duration::seconds(seconds);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Parse a time zone given as `UTC`, `Z`, or a fixed offset like `+02:00`.
pub fn parse_time_zone(value: &str) -> Result<FixedOffset, ConfigError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(utc_offset());
    }

    let invalid = || ConfigError::InvalidTimeZone(value.to_string());

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    if !rest.is_ascii() {
        return Err(invalid());
    }

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// The zero offset.
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}
