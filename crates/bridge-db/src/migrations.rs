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
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS links (
                group_key   TEXT NOT NULL,
                channel_id  INTEGER NOT NULL,
                note        TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(group_key, channel_id)
            );

            CREATE INDEX IF NOT EXISTS idx_links_channel
                ON links(channel_id);

            CREATE TABLE IF NOT EXISTS messages (
                source_channel_id   INTEGER NOT NULL,
                source_message_id   INTEGER NOT NULL,
                copy_channel_id     INTEGER NOT NULL,
                copy_message_id     INTEGER NOT NULL,
                recorded_at         TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(source_channel_id, source_message_id, copy_channel_id, copy_message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_copy
                ON messages(copy_channel_id, copy_message_id);

            CREATE INDEX IF NOT EXISTS idx_messages_recorded
                ON messages(recorded_at);

            CREATE TABLE IF NOT EXISTS authors (
                display_name  TEXT NOT NULL,
                user_id       INTEGER NOT NULL,
                last_seen     INTEGER NOT NULL,
                UNIQUE(display_name, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
