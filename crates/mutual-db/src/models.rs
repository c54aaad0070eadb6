//! Row mapping between SQLite and the `mutual-types` models.
//!
//! Ids are stored as UUID text, timestamps as unix milliseconds.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use mutual_types::models::{MatchPair, PresetAggregate, PushSubscription, SentMessage};

/// Columns of `sent_messages`, with the table aliased as `m`.
pub(crate) const MESSAGE_COLUMNS: &str =
    "m.id, m.sender_id, m.receiver_id, m.text, m.created_at, m.is_hidden, m.expires_at";

pub(crate) const MATCH_COLUMNS: &str = "p.id, p.user1_id, p.user2_id, p.text, p.matched_at";

pub(crate) const AGGREGATE_COLUMNS: &str = "a.text, a.total_send_count, a.distinct_sender_count, \
     a.last_sent_at, a.created_by, a.link_title, a.link_image";

pub(crate) const PUSH_COLUMNS: &str = "id, user_id, endpoint, p256dh, auth, is_active";

/// True when a MatchPair links the message's two users on the message's text,
/// in either orientation. Expects the message table aliased as `m`.
pub(crate) const MATCHED_PREDICATE: &str = "EXISTS (
        SELECT 1 FROM match_pairs mp
        WHERE mp.text = m.text
          AND ((mp.user1_id = m.sender_id AND mp.user2_id = m.receiver_id)
            OR (mp.user1_id = m.receiver_id AND mp.user2_id = m.sender_id))
    )";

pub(crate) fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms)),
        None => Ok(None),
    }
}

/// Reads `MESSAGE_COLUMNS` starting at column 0.
pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<SentMessage> {
    Ok(SentMessage {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        receiver_id: uuid_at(row, 2)?,
        text: row.get(3)?,
        created_at: time_at(row, 4)?,
        is_hidden: row.get(5)?,
        expires_at: opt_time_at(row, 6)?,
    })
}

pub(crate) fn match_from_row(row: &Row) -> rusqlite::Result<MatchPair> {
    Ok(MatchPair {
        id: uuid_at(row, 0)?,
        user1_id: uuid_at(row, 1)?,
        user2_id: uuid_at(row, 2)?,
        text: row.get(3)?,
        matched_at: time_at(row, 4)?,
    })
}

pub(crate) fn aggregate_from_row(row: &Row) -> rusqlite::Result<PresetAggregate> {
    Ok(PresetAggregate {
        text: row.get(0)?,
        total_send_count: row.get(1)?,
        distinct_sender_count: row.get(2)?,
        last_sent_at: time_at(row, 3)?,
        created_by: uuid_at(row, 4)?,
        link_title: row.get(5)?,
        link_image: row.get(6)?,
    })
}

pub(crate) fn push_from_row(row: &Row) -> rusqlite::Result<PushSubscription> {
    Ok(PushSubscription {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        endpoint: row.get(2)?,
        p256dh: row.get(3)?,
        auth: row.get(4)?,
        is_active: row.get(5)?,
    })
}

/// `?{start}, ?{start+1}, ...` for an IN clause of `n` values.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// LIKE pattern for a substring search, escaping `%`, `_` and `\`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(4, 2), "?4, ?5");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern(""), "%%");
    }
}
