use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{info, warn};
use uuid::Uuid;

use mutual_types::models::PushSubscription;

use crate::Database;
use crate::models::{PUSH_COLUMNS, millis, push_from_row};

impl Database {
    /// Register or re-activate a push endpoint. An endpoint belongs to one
    /// user at a time; re-registering moves it.
    pub fn upsert_push_subscription(
        &self,
        user_id: Uuid,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        now: DateTime<Utc>,
    ) -> Result<PushSubscription> {
        self.with_tx(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                 ON CONFLICT(endpoint) DO UPDATE SET
                     user_id = excluded.user_id,
                     p256dh = excluded.p256dh,
                     auth = excluded.auth,
                     is_active = 1",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    endpoint,
                    p256dh,
                    auth,
                    millis(now),
                ],
            )?;
            let sql = format!("SELECT {} FROM push_subscriptions WHERE endpoint = ?1", PUSH_COLUMNS);
            Ok(conn.query_row(&sql, [endpoint], push_from_row)?)
        })
    }

    pub fn active_push_subscriptions(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM push_subscriptions WHERE user_id = ?1 AND is_active = 1",
                PUSH_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], push_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark an endpoint dead after the push service reported it gone.
    pub fn deactivate_push_endpoint(&self, endpoint: &str) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE push_subscriptions SET is_active = 0 WHERE endpoint = ?1 AND is_active = 1",
                [endpoint],
            )?)
        })?;
        if changed > 0 {
            warn!("Push endpoint deactivated: {}", endpoint);
        }
        Ok(changed > 0)
    }

    /// User-initiated unsubscribe; only touches the caller's own endpoint.
    pub fn unsubscribe_push(&self, user_id: Uuid, endpoint: &str) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM push_subscriptions WHERE endpoint = ?1",
                    [endpoint],
                    |r| r.get(0),
                )
                .optional()?;
            if owner.as_deref() != Some(user_id.to_string().as_str()) {
                return Ok(0);
            }
            Ok(conn.execute(
                "UPDATE push_subscriptions SET is_active = 0 WHERE endpoint = ?1",
                [endpoint],
            )?)
        })?;
        if changed > 0 {
            info!("User {} unsubscribed a push endpoint", user_id);
        }
        Ok(changed > 0)
    }
}
