//! Per-text aggregate tracking.
//!
//! `preset_aggregates` is a cache over `sent_messages`. Every send, removal
//! or visibility change re-derives the row from the ledger inside the
//! caller's transaction; the counters are never adjusted in place.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use mutual_types::expiry::match_expiry_boundary;
use mutual_types::models::PresetAggregate;

use crate::Database;
use crate::error::LedgerError;
use crate::models::{AGGREGATE_COLUMNS, aggregate_from_row, millis};

/// Record a send of `text`. Must run in the same transaction that inserted
/// the ledger row, after the insert.
pub(crate) fn on_send(conn: &Connection, text: &str) -> Result<PresetAggregate> {
    recompute(conn, text)?.ok_or_else(|| anyhow::anyhow!("aggregate for {:?} missing after send", text))
}

/// Re-derive the aggregate for `text` from the visible ledger rows.
/// Deletes the row when no visible message with that text remains.
pub(crate) fn recompute(conn: &Connection, text: &str) -> Result<Option<PresetAggregate>> {
    let (count, distinct, last_sent_at): (i64, i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT sender_id), MAX(created_at)
         FROM sent_messages WHERE text = ?1 AND is_hidden = 0",
        [text],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let Some(last_sent_at) = last_sent_at.filter(|_| count > 0) else {
        let removed = conn.execute("DELETE FROM preset_aggregates WHERE text = ?1", [text])?;
        if removed > 0 {
            debug!("Aggregate for {:?} dropped (no visible messages left)", text);
        }
        return Ok(None);
    };

    // Only consulted when the row has to be recreated, e.g. after an unhide.
    let first_sender: String = conn.query_row(
        "SELECT sender_id FROM sent_messages
         WHERE text = ?1 AND is_hidden = 0
         ORDER BY created_at ASC LIMIT 1",
        [text],
        |r| r.get(0),
    )?;

    conn.execute(
        "INSERT INTO preset_aggregates
             (text, total_send_count, distinct_sender_count, last_sent_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(text) DO UPDATE SET
             total_send_count = excluded.total_send_count,
             distinct_sender_count = excluded.distinct_sender_count,
             last_sent_at = excluded.last_sent_at",
        rusqlite::params![text, count, distinct, last_sent_at, first_sender],
    )?;

    debug!("Aggregate for {:?} recomputed: count={} distinct={}", text, count, distinct);
    query_aggregate(conn, text)
}

pub(crate) fn query_aggregate(conn: &Connection, text: &str) -> Result<Option<PresetAggregate>> {
    let sql = format!("SELECT {} FROM preset_aggregates a WHERE a.text = ?1", AGGREGATE_COLUMNS);
    Ok(conn.query_row(&sql, [text], aggregate_from_row).optional()?)
}

impl Database {
    pub fn get_aggregate(&self, text: &str) -> Result<Option<PresetAggregate>> {
        self.with_conn(|conn| query_aggregate(conn, text))
    }

    /// Aggregates still inside the match window, most sent first.
    pub fn list_live_presets(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<PresetAggregate>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM preset_aggregates a
                 WHERE a.last_sent_at >= ?1
                 ORDER BY a.total_send_count DESC, a.last_sent_at DESC
                 LIMIT ?2",
                AGGREGATE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![millis(match_expiry_boundary(now)), limit],
                    aggregate_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Store cached link-preview metadata on an existing aggregate.
    pub fn set_preset_preview(
        &self,
        text: &str,
        link_title: Option<&str>,
        link_image: Option<&str>,
    ) -> Result<PresetAggregate> {
        self.with_tx(|conn| {
            let updated = conn.execute(
                "UPDATE preset_aggregates SET link_title = ?2, link_image = ?3 WHERE text = ?1",
                rusqlite::params![text, link_title, link_image],
            )?;
            if updated == 0 {
                return Err(LedgerError::NotFound.into());
            }
            query_aggregate(conn, text)?.ok_or_else(|| LedgerError::NotFound.into())
        })
    }
}
