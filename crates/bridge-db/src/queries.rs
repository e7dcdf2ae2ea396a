use crate::models::{CorrelationRow, LinkRow};
use crate::store::{AuthorStore, CorrelationStore, LinkStore};
use crate::Database;
use anyhow::Result;
use bridge_types::{ChannelId, GroupKey, MessageId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

const INSERT_CORRELATION: &str = "INSERT OR IGNORE INTO messages
    (source_channel_id, source_message_id, copy_channel_id, copy_message_id)
    VALUES (?1, ?2, ?3, ?4)";

impl LinkStore for Database {
    fn add_link(&self, key: &GroupKey, channel: ChannelId, note: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO links (group_key, channel_id, note) VALUES (?1, ?2, ?3)",
                rusqlite::params![key.as_str(), channel.to_i64(), note],
            )?;
            Ok(())
        })
    }

    fn remove_link(&self, key: &GroupKey, channel: ChannelId) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM links WHERE group_key = ?1 AND channel_id = ?2",
                rusqlite::params![key.as_str(), channel.to_i64()],
            )?;
            Ok(removed)
        })
    }

    fn remove_all_links(&self, channel: ChannelId) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM links WHERE channel_id = ?1", [channel.to_i64()])?;
            Ok(removed)
        })
    }

    fn list_groups(&self, channel: ChannelId) -> Result<Vec<LinkRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT group_key, note FROM links WHERE channel_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([channel.to_i64()], |row| {
                    Ok(LinkRow {
                        group_key: GroupKey::from_stored(row.get(0)?),
                        note: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn fan_out_targets(&self, channel: ChannelId) -> Result<Vec<ChannelId>> {
        self.with_conn(|conn| {
            // A channel reachable through several shared groups must appear once.
            let mut stmt = conn.prepare(
                "SELECT l.channel_id FROM links l
                 WHERE l.group_key IN (SELECT group_key FROM links WHERE channel_id = ?1)
                   AND l.channel_id != ?1
                 GROUP BY l.channel_id
                 ORDER BY MIN(l.rowid)",
            )?;
            let targets = stmt
                .query_map([channel.to_i64()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(ChannelId::from_i64))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(targets)
        })
    }
}

impl CorrelationStore for Database {
    fn record_correlation(&self, row: &CorrelationRow) -> Result<()> {
        self.with_conn(|conn| insert_correlation(conn, row))
    }

    fn record_correlations(&self, rows: &[CorrelationRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.with_tx(|tx| {
            for row in rows {
                insert_correlation(tx, row)?;
            }
            Ok(())
        })
    }

    fn find_copy(
        &self,
        source_channel: ChannelId,
        source_message: MessageId,
        target_channel: ChannelId,
    ) -> Result<Option<MessageId>> {
        self.with_conn(|conn| query_copy(conn, source_channel, source_message, target_channel))
    }

    fn resolve_representative(
        &self,
        message: MessageId,
        known_channel: ChannelId,
        target_channel: ChannelId,
    ) -> Result<Option<MessageId>> {
        if known_channel == target_channel {
            return Ok(Some(message));
        }

        self.with_conn(|conn| {
            // The message is the original.
            if let Some(copy) = query_copy(conn, known_channel, message, target_channel)? {
                return Ok(Some(copy));
            }

            // The message is a copy: walk back to its original first.
            let source: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT source_channel_id, source_message_id FROM messages
                     WHERE copy_channel_id = ?1 AND copy_message_id = ?2
                     LIMIT 1",
                    [known_channel.to_i64(), message.to_i64()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((source_channel, source_message)) = source else {
                return Ok(None);
            };
            let source_channel = ChannelId::from_i64(source_channel);
            let source_message = MessageId::from_i64(source_message);

            if source_channel == target_channel {
                return Ok(Some(source_message));
            }
            query_copy(conn, source_channel, source_message, target_channel)
        })
    }

    fn prune_correlations(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = older_than.format("%Y-%m-%d %H:%M:%S").to_string();
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM messages WHERE recorded_at < ?1", [cutoff])?;
            Ok(removed)
        })
    }
}

impl AuthorStore for Database {
    fn record_author(&self, display_name: &str, user: UserId) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            // last_seen only moves forward, even for two records in the same millisecond.
            conn.execute(
                "INSERT INTO authors (display_name, user_id, last_seen)
                 VALUES (?1, ?2, MAX(?3, (SELECT COALESCE(MAX(last_seen), 0) + 1 FROM authors)))
                 ON CONFLICT(display_name, user_id) DO UPDATE SET last_seen = excluded.last_seen",
                rusqlite::params![display_name, user.to_i64(), now],
            )?;
            Ok(())
        })
    }

    fn lookup_author(&self, display_name: &str) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT user_id FROM authors WHERE display_name = ?1
                     ORDER BY last_seen DESC LIMIT 1",
                    [display_name],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(user.map(UserId::from_i64))
        })
    }
}

fn insert_correlation(conn: &Connection, row: &CorrelationRow) -> Result<()> {
    conn.execute(
        INSERT_CORRELATION,
        [
            row.source_channel_id.to_i64(),
            row.source_message_id.to_i64(),
            row.copy_channel_id.to_i64(),
            row.copy_message_id.to_i64(),
        ],
    )?;
    Ok(())
}

fn query_copy(
    conn: &Connection,
    source_channel: ChannelId,
    source_message: MessageId,
    target_channel: ChannelId,
) -> Result<Option<MessageId>> {
    let copy = conn
        .query_row(
            "SELECT copy_message_id FROM messages
             WHERE source_channel_id = ?1 AND source_message_id = ?2 AND copy_channel_id = ?3
             LIMIT 1",
            [source_channel.to_i64(), source_message.to_i64(), target_channel.to_i64()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(copy.map(MessageId::from_i64))
}
