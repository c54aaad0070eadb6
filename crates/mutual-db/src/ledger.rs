//! The message ledger and its moderation pipeline.
//!
//! Message lifecycle: `Visible -> Hidden | Deleted`, `Hidden -> Visible |
//! Deleted`. Every transition that removes or hides rows re-derives the
//! affected aggregates in the same transaction.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use mutual_types::expiry::{match_expiry_boundary, message_expires_at};
use mutual_types::filter::{ContentFilter, KeywordFilter};
use mutual_types::models::{MatchPair, SentMessage};

use crate::Database;
use crate::aggregates;
use crate::error::LedgerError;
use crate::matches::{self, MatchPolicy};
use crate::models::{MATCHED_PREDICATE, MESSAGE_COLUMNS, like_pattern, message_from_row, millis, placeholders};

/// Longest accepted message text, in characters.
pub const MAX_TEXT_CHARS: usize = 280;

/// Most ids one cancel/hide/delete call may name. Keeps the IN clause well
/// under SQLite's bound-parameter limit.
pub const MAX_BATCH_IDS: usize = 1000;

pub const MAX_SWEEP_KEYWORDS: usize = 500;

/// Result of a batch cancel/hide/delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Ids whose state actually changed.
    pub affected: Vec<Uuid>,
    /// Ids left alone because they belong to an established match.
    pub skipped_matched: Vec<Uuid>,
}

/// A send as requested by a user, before validation.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: &'a str,
    pub expiry_days: Option<i64>,
}

/// Which rows a removal is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Only rows without a MatchPair; refuse if every target is matched.
    UnmatchedOnly,
    /// Matched rows too. MatchPairs themselves are never removed.
    IncludingMatched,
}

impl Database {
    /// Append a directed message and bump its text's aggregate.
    pub fn append(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
        expiry_days: Option<i64>,
        now: DateTime<Utc>,
        filter: &dyn ContentFilter,
    ) -> Result<SentMessage> {
        let new = NewMessage {
            sender_id,
            receiver_id,
            text,
            expiry_days,
        };
        let message = prepare_message(&new, now, filter)?;
        self.with_tx(|conn| insert_message(conn, &message))?;

        debug!("Message {} appended ({} -> {})", message.id, sender_id, receiver_id);
        Ok(message)
    }

    /// Append and run match detection as one transaction. If detection
    /// fails the message is not stored either, so the caller may retry.
    pub fn append_and_check(
        &self,
        new: NewMessage<'_>,
        now: DateTime<Utc>,
        filter: &dyn ContentFilter,
        policy: MatchPolicy,
    ) -> Result<(SentMessage, Vec<MatchPair>)> {
        let message = prepare_message(&new, now, filter)?;

        let pairs = self.with_tx(|conn| {
            insert_message(conn, &message)?;
            matches::detect(conn, message.sender_id, &message.text, now, policy)
        })?;

        debug!("Message {} appended ({} -> {})", message.id, message.sender_id, message.receiver_id);
        matches::log_created(&pairs);
        Ok((message, pairs))
    }

    /// Sender-initiated cancellation of unmatched messages.
    ///
    /// Fails with `Unauthorized` if any target belongs to someone else,
    /// `NotFound` if none of the ids exist, and `Conflict` if every target is
    /// already matched. Nothing is mutated on failure.
    pub fn cancel(&self, message_ids: &[Uuid], requesting_user_id: Uuid) -> Result<MutationOutcome> {
        let outcome = self.remove(message_ids, Some(requesting_user_id), Scope::UnmatchedOnly)?;
        info!(
            "User {} cancelled {} message(s), {} skipped as matched",
            requesting_user_id,
            outcome.affected.len(),
            outcome.skipped_matched.len()
        );
        Ok(outcome)
    }

    /// Admin deletion of unmatched messages.
    pub fn delete_unmatched(&self, message_ids: &[Uuid]) -> Result<MutationOutcome> {
        let outcome = self.remove(message_ids, None, Scope::UnmatchedOnly)?;
        info!("Admin deleted {} unmatched message(s)", outcome.affected.len());
        Ok(outcome)
    }

    /// Admin deletion that also removes matched messages. Established
    /// MatchPairs are kept.
    pub fn delete_including_matched(&self, message_ids: &[Uuid]) -> Result<MutationOutcome> {
        let outcome = self.remove(message_ids, None, Scope::IncludingMatched)?;
        info!("Admin force-deleted {} message(s)", outcome.affected.len());
        Ok(outcome)
    }

    /// Moderation hide. Already-hidden rows are a no-op.
    pub fn hide(&self, message_ids: &[Uuid]) -> Result<MutationOutcome> {
        let outcome = self.set_hidden(message_ids, true)?;
        info!("Admin hid {} message(s)", outcome.affected.len());
        Ok(outcome)
    }

    /// Moderation unhide. Visible rows are a no-op.
    pub fn unhide(&self, message_ids: &[Uuid]) -> Result<MutationOutcome> {
        let outcome = self.set_hidden(message_ids, false)?;
        info!("Admin unhid {} message(s)", outcome.affected.len());
        Ok(outcome)
    }

    /// Hide every visible, unmatched message whose text contains any of
    /// `keywords` (case-insensitive). Returns the ids that were hidden.
    pub fn hide_all_matching(&self, keywords: &[String]) -> Result<Vec<Uuid>> {
        let filter = KeywordFilter::new(keywords);
        if filter.keywords().is_empty() {
            return Err(LedgerError::Validation("at least one keyword is required".into()).into());
        }

        if filter.keywords().len() > MAX_SWEEP_KEYWORDS {
            return Err(LedgerError::Validation(format!("at most {} keywords per sweep", MAX_SWEEP_KEYWORDS)).into());
        }

        // SQLite only folds ASCII case, so the LIKE prefilter is skipped when
        // a keyword needs Unicode folding. `should_hide` stays authoritative.
        let patterns: Vec<String> = if filter.keywords().iter().all(|k| k.is_ascii()) {
            filter.keywords().iter().map(|k| like_pattern(k)).collect()
        } else {
            Vec::new()
        };
        let keyword_clause = if patterns.is_empty() {
            String::new()
        } else {
            let any = (1..=patterns.len())
                .map(|i| format!("LOWER(m.text) LIKE ?{} ESCAPE '\\'", i))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("AND ({})", any)
        };

        let hidden = self.with_tx(|conn| {
            let sql = format!(
                "SELECT {} FROM sent_messages m WHERE m.is_hidden = 0 AND NOT {} {}",
                MESSAGE_COLUMNS, MATCHED_PREDICATE, keyword_clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let candidates = stmt
                .query_map(rusqlite::params_from_iter(patterns.iter()), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let targets: Vec<&SentMessage> =
                candidates.iter().filter(|m| filter.should_hide(&m.text)).collect();

            let mut texts = BTreeSet::new();
            let mut ids = Vec::with_capacity(targets.len());
            for m in targets {
                conn.execute(
                    "UPDATE sent_messages SET is_hidden = 1 WHERE id = ?1",
                    [m.id.to_string()],
                )?;
                texts.insert(m.text.clone());
                ids.push(m.id);
            }
            recompute_texts(conn, &texts)?;
            Ok(ids)
        })?;

        info!("Keyword sweep hid {} message(s)", hidden.len());
        Ok(hidden)
    }

    /// Messages addressed to `user_id` that are visible, not yet matched, and
    /// whose text has been sent by anyone within the match window.
    pub fn list_unmatched_for_receiver(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<SentMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM sent_messages m
                 JOIN preset_aggregates a ON a.text = m.text
                 WHERE m.receiver_id = ?1
                   AND m.is_hidden = 0
                   AND a.last_sent_at >= ?2
                   AND NOT {}
                 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS, MATCHED_PREDICATE
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id.to_string(), millis(match_expiry_boundary(now))],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Size of `list_unmatched_for_receiver`, without materialising rows.
    pub fn count_unmatched_for_receiver(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM sent_messages m
                 JOIN preset_aggregates a ON a.text = m.text
                 WHERE m.receiver_id = ?1
                   AND m.is_hidden = 0
                   AND a.last_sent_at >= ?2
                   AND NOT {}",
                MATCHED_PREDICATE
            );
            let count: i64 = conn.query_row(
                &sql,
                rusqlite::params![user_id.to_string(), millis(match_expiry_boundary(now))],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// The user's own visible sent messages, newest first, with a matched flag.
    pub fn list_sent_by(&self, user_id: Uuid) -> Result<Vec<(SentMessage, bool)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, {} FROM sent_messages m
                 WHERE m.sender_id = ?1 AND m.is_hidden = 0
                 ORDER BY m.created_at DESC",
                MESSAGE_COLUMNS, MATCHED_PREDICATE
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| Ok((message_from_row(row)?, row.get::<_, bool>(7)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<SentMessage>> {
        self.with_conn(|conn| {
            Ok(fetch_with_match_flag(conn, &[id])?.into_iter().next().map(|(m, _)| m))
        })
    }

    /// Admin search over unmatched messages, hidden ones included.
    /// `user_id` restricts to messages the user sent or received.
    pub fn search_unmatched(&self, query: &str, user_id: Option<Uuid>, limit: u32) -> Result<Vec<SentMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM sent_messages m
                 WHERE m.text LIKE ?1 ESCAPE '\\'
                   AND (?2 IS NULL OR m.sender_id = ?2 OR m.receiver_id = ?2)
                   AND NOT {}
                 ORDER BY m.created_at DESC
                 LIMIT ?3",
                MESSAGE_COLUMNS, MATCHED_PREDICATE
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![like_pattern(query), user_id.map(|u| u.to_string()), limit],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete unmatched messages whose own `expires_at` has passed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_tx(|conn| {
            let sql = format!(
                "SELECT {} FROM sent_messages m
                 WHERE m.expires_at IS NOT NULL AND m.expires_at < ?1 AND NOT {}",
                MESSAGE_COLUMNS, MATCHED_PREDICATE
            );
            let mut stmt = conn.prepare(&sql)?;
            let expired = stmt
                .query_map([millis(now)], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut texts = BTreeSet::new();
            for m in &expired {
                conn.execute("DELETE FROM sent_messages WHERE id = ?1", [m.id.to_string()])?;
                texts.insert(m.text.clone());
            }
            recompute_texts(conn, &texts)?;
            Ok(expired.len())
        })
    }

    fn remove(&self, message_ids: &[Uuid], owner: Option<Uuid>, scope: Scope) -> Result<MutationOutcome> {
        require_ids(message_ids)?;

        self.with_tx(|conn| {
            let rows = fetch_with_match_flag(conn, message_ids)?;
            if rows.is_empty() {
                return Err(LedgerError::NotFound.into());
            }

            if let Some(user_id) = owner {
                if let Some((m, _)) = rows.iter().find(|(m, _)| m.sender_id != user_id) {
                    return Err(LedgerError::Unauthorized { user_id, message_id: m.id }.into());
                }
            }

            let mut outcome = MutationOutcome::default();
            let mut texts = BTreeSet::new();
            for (m, matched) in &rows {
                if *matched && scope == Scope::UnmatchedOnly {
                    outcome.skipped_matched.push(m.id);
                    continue;
                }
                conn.execute("DELETE FROM sent_messages WHERE id = ?1", [m.id.to_string()])?;
                texts.insert(m.text.clone());
                outcome.affected.push(m.id);
            }

            if outcome.affected.is_empty() {
                return Err(all_matched_conflict());
            }

            recompute_texts(conn, &texts)?;
            Ok(outcome)
        })
    }

    fn set_hidden(&self, message_ids: &[Uuid], hidden: bool) -> Result<MutationOutcome> {
        require_ids(message_ids)?;

        self.with_tx(|conn| {
            let rows = fetch_with_match_flag(conn, message_ids)?;
            if rows.is_empty() {
                return Err(LedgerError::NotFound.into());
            }

            let mut outcome = MutationOutcome::default();
            let mut texts = BTreeSet::new();
            for (m, matched) in &rows {
                // Matched messages go through the stricter deletion path.
                if hidden && *matched {
                    outcome.skipped_matched.push(m.id);
                    continue;
                }
                if m.is_hidden == hidden {
                    continue;
                }
                conn.execute(
                    "UPDATE sent_messages SET is_hidden = ?2 WHERE id = ?1",
                    rusqlite::params![m.id.to_string(), hidden],
                )?;
                texts.insert(m.text.clone());
                outcome.affected.push(m.id);
            }

            if hidden && outcome.affected.is_empty() && outcome.skipped_matched.len() == rows.len() {
                return Err(all_matched_conflict());
            }

            recompute_texts(conn, &texts)?;
            Ok(outcome)
        })
    }
}

/// Validate and build the row; nothing is written yet.
fn prepare_message(new: &NewMessage<'_>, now: DateTime<Utc>, filter: &dyn ContentFilter) -> Result<SentMessage> {
    let text = validate_text(new.text)?;
    if new.sender_id == new.receiver_id {
        return Err(LedgerError::Validation("cannot send a message to yourself".into()).into());
    }
    if filter.should_hide(&text) {
        info!("Message from {} rejected by content filter", new.sender_id);
        return Err(LedgerError::ContentRejected.into());
    }

    Ok(SentMessage {
        id: Uuid::new_v4(),
        sender_id: new.sender_id,
        receiver_id: new.receiver_id,
        text,
        created_at: now,
        is_hidden: false,
        expires_at: message_expires_at(now, new.expiry_days),
    })
}

fn insert_message(conn: &Connection, message: &SentMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO sent_messages (id, sender_id, receiver_id, text, created_at, is_hidden, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        rusqlite::params![
            message.id.to_string(),
            message.sender_id.to_string(),
            message.receiver_id.to_string(),
            &message.text,
            millis(message.created_at),
            message.expires_at.map(millis),
        ],
    )?;
    aggregates::on_send(conn, &message.text)?;
    Ok(())
}

fn validate_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::Validation("text must not be empty".into()).into());
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return Err(LedgerError::Validation(format!("text exceeds {} characters", MAX_TEXT_CHARS)).into());
    }
    Ok(trimmed.to_string())
}

fn require_ids(message_ids: &[Uuid]) -> Result<()> {
    if message_ids.is_empty() {
        return Err(LedgerError::Validation("at least one message id is required".into()).into());
    }
    if message_ids.len() > MAX_BATCH_IDS {
        return Err(LedgerError::Validation(format!("at most {} message ids per request", MAX_BATCH_IDS)).into());
    }
    Ok(())
}

fn all_matched_conflict() -> anyhow::Error {
    LedgerError::Conflict(
        "all specified messages are already matched; use the matched-message deletion path".into(),
    )
    .into()
}

/// Load the rows for `ids` (missing ids are skipped) with whether each is matched.
fn fetch_with_match_flag(conn: &Connection, ids: &[Uuid]) -> Result<Vec<(SentMessage, bool)>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let sql = format!(
        "SELECT {}, {} FROM sent_messages m WHERE m.id IN ({})",
        MESSAGE_COLUMNS,
        MATCHED_PREDICATE,
        placeholders(1, ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(ids.iter().map(|id| id.to_string())),
            |row| Ok((message_from_row(row)?, row.get::<_, bool>(7)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn recompute_texts(conn: &Connection, texts: &BTreeSet<String>) -> Result<()> {
    for text in texts {
        aggregates::recompute(conn, text)?;
    }
    Ok(())
}
