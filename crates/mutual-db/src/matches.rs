use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use mutual_types::expiry::match_expiry_boundary;
use mutual_types::models::MatchPair;

use crate::Database;
use crate::models::{MATCH_COLUMNS, like_pattern, match_from_row, millis, uuid_at};

/// How the detector treats a qualifying reverse message when an equivalent
/// MatchPair already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// `true` appends a new MatchPair on every qualifying check, so re-sends
    /// produce a log of match events. `false` creates at most one pair per
    /// (users, text).
    pub allow_duplicate_matches: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            allow_duplicate_matches: true,
        }
    }
}

impl Database {
    /// Run match detection for `sender_id` having just sent `text`.
    ///
    /// Every distinct user who sent `text` to `sender_id` (visible, and with
    /// the text still inside the match window) yields one new MatchPair with
    /// `sender_id` as `user1`. Zero candidates is a no-op.
    pub fn check_match(
        &self,
        sender_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
        policy: MatchPolicy,
    ) -> Result<Vec<MatchPair>> {
        let text = text.trim();
        let created = self.with_tx(|conn| detect(conn, sender_id, text, now, policy))?;
        log_created(&created);
        Ok(created)
    }

    /// All MatchPairs involving `user_id`, newest first.
    pub fn list_matches_for_user(&self, user_id: Uuid) -> Result<Vec<MatchPair>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM match_pairs p
                 WHERE p.user1_id = ?1 OR p.user2_id = ?1
                 ORDER BY p.matched_at DESC",
                MATCH_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], match_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Admin search over MatchPairs by text substring and optional participant.
    pub fn search_matched(&self, query: &str, user_id: Option<Uuid>, limit: u32) -> Result<Vec<MatchPair>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM match_pairs p
                 WHERE p.text LIKE ?1 ESCAPE '\\'
                   AND (?2 IS NULL OR p.user1_id = ?2 OR p.user2_id = ?2)
                 ORDER BY p.matched_at DESC
                 LIMIT ?3",
                MATCH_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![like_pattern(query), user_id.map(|u| u.to_string()), limit],
                    match_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Create the MatchPairs for `sender_id` having sent `text`, inside the
/// caller's transaction.
pub(crate) fn detect(
    conn: &Connection,
    sender_id: Uuid,
    text: &str,
    now: DateTime<Utc>,
    policy: MatchPolicy,
) -> Result<Vec<MatchPair>> {
    let candidates = reverse_senders(conn, sender_id, text, now)?;
    let mut created = Vec::with_capacity(candidates.len());

    for other_id in candidates {
        if !policy.allow_duplicate_matches && pair_exists(conn, sender_id, other_id, text)? {
            debug!("Match {} <-> {} on {:?} already recorded, skipping", sender_id, other_id, text);
            continue;
        }

        let pair = MatchPair {
            id: Uuid::new_v4(),
            user1_id: sender_id,
            user2_id: other_id,
            text: text.to_string(),
            matched_at: now,
        };
        conn.execute(
            "INSERT INTO match_pairs (id, user1_id, user2_id, text, matched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                pair.id.to_string(),
                pair.user1_id.to_string(),
                pair.user2_id.to_string(),
                &pair.text,
                millis(now),
            ],
        )?;
        created.push(pair);
    }

    Ok(created)
}

pub(crate) fn log_created(pairs: &[MatchPair]) {
    for pair in pairs {
        info!("Match {} created: {} <-> {}", pair.id, pair.user1_id, pair.user2_id);
    }
}

/// Distinct senders of live, visible `text` addressed to `receiver_id`,
/// earliest first.
fn reverse_senders(conn: &Connection, receiver_id: Uuid, text: &str, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT m.sender_id FROM sent_messages m
         JOIN preset_aggregates a ON a.text = m.text
         WHERE m.receiver_id = ?1
           AND m.text = ?2
           AND m.is_hidden = 0
           AND m.sender_id != ?1
           AND a.last_sent_at >= ?3
         GROUP BY m.sender_id
         ORDER BY MIN(m.created_at) ASC",
    )?;
    let ids = stmt
        .query_map(
            rusqlite::params![receiver_id.to_string(), text, millis(match_expiry_boundary(now))],
            |row| uuid_at(row, 0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn pair_exists(conn: &Connection, a: Uuid, b: Uuid, text: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
             SELECT 1 FROM match_pairs
             WHERE text = ?3
               AND ((user1_id = ?1 AND user2_id = ?2) OR (user1_id = ?2 AND user2_id = ?1))
         )",
        rusqlite::params![a.to_string(), b.to_string(), text],
        |r| r.get(0),
    )?;
    Ok(exists)
}
