//! Expiry rules for match eligibility and per-message retention.
//!
//! Match eligibility is keyed to the most recent send of a text across all
//! users (`PresetAggregate::last_sent_at`), not to the individual message.

use chrono::{DateTime, TimeDelta, Utc};

/// Hours a text stays live for matching after its last system-wide send.
pub const MATCH_EXPIRY_HOURS: i64 = 24;

/// Retention choices a sender may pick for a message's own `expires_at`.
pub const ALLOWED_EXPIRY_DAYS: [i64; 3] = [1, 7, 14];

pub const DEFAULT_EXPIRY_DAYS: i64 = 1;

pub fn match_expiry_window() -> TimeDelta {
    TimeDelta::hours(MATCH_EXPIRY_HOURS)
}

/// `now - 24h`. Aggregates last sent at or after this instant are live; the
/// store compares against this value in SQL.
pub fn match_expiry_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    now - match_expiry_window()
}

pub fn is_valid_expiry_days(days: i64) -> bool {
    ALLOWED_EXPIRY_DAYS.contains(&days)
}

/// Fails closed: anything outside the allowed set becomes the default.
pub fn normalize_expiry_days(days: i64) -> i64 {
    if is_valid_expiry_days(days) {
        days
    } else {
        DEFAULT_EXPIRY_DAYS
    }
}

/// Per-message `expires_at` for an optional requested retention.
pub fn message_expires_at(now: DateTime<Utc>, days: Option<i64>) -> Option<DateTime<Utc>> {
    days.map(|d| now + TimeDelta::days(normalize_expiry_days(d)))
}
