use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // Timestamps are unix milliseconds.
        conn.execute_batch(
            "
            CREATE TABLE sent_messages (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                text        TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                is_hidden   INTEGER NOT NULL DEFAULT 0,
                expires_at  INTEGER
            );

            CREATE INDEX idx_sent_receiver_text
                ON sent_messages(receiver_id, text);
            CREATE INDEX idx_sent_text
                ON sent_messages(text, is_hidden);
            CREATE INDEX idx_sent_sender
                ON sent_messages(sender_id, created_at);

            CREATE TABLE match_pairs (
                id          TEXT PRIMARY KEY,
                user1_id    TEXT NOT NULL,
                user2_id    TEXT NOT NULL,
                text        TEXT NOT NULL,
                matched_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_match_users
                ON match_pairs(user1_id, user2_id, text);
            CREATE INDEX idx_match_user2
                ON match_pairs(user2_id);

            CREATE TABLE preset_aggregates (
                text                  TEXT PRIMARY KEY,
                total_send_count      INTEGER NOT NULL,
                distinct_sender_count INTEGER NOT NULL,
                last_sent_at          INTEGER NOT NULL,
                created_by            TEXT NOT NULL,
                link_title            TEXT,
                link_image            TEXT
            );

            CREATE TABLE push_subscriptions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                endpoint    TEXT NOT NULL UNIQUE,
                p256dh      TEXT NOT NULL,
                auth        TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_push_user
                ON push_subscriptions(user_id, is_active);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
