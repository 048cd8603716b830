//! Presence repository: stateless SQL over the `presence` table.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision in UTC,
//! so lexical order matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::{PresenceStoreError, Result};
use crate::record::PresenceRecord;

/// Presence repository. Every method takes `&Connection`.
pub struct PresenceRepo;

impl PresenceRepo {
    /// Upsert `user` as online. An existing `last_seen_at` is kept.
    pub fn set_online(conn: &Connection, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO presence (user_id, is_online, last_seen_at, updated_at)
             VALUES (?1, 1, NULL, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
               is_online = 1,
               updated_at = excluded.updated_at",
            params![user_id, format_ts(at)],
        )?;
        Ok(())
    }

    /// Upsert `user` as offline, last seen at `at`.
    pub fn set_offline(conn: &Connection, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let ts = format_ts(at);
        let _ = conn.execute(
            "INSERT INTO presence (user_id, is_online, last_seen_at, updated_at)
             VALUES (?1, 0, ?2, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
               is_online = 0,
               last_seen_at = excluded.last_seen_at,
               updated_at = excluded.updated_at",
            params![user_id, ts],
        )?;
        Ok(())
    }

    /// Fetch one record.
    pub fn get(conn: &Connection, user_id: &str) -> Result<Option<PresenceRecord>> {
        let raw = conn
            .query_row(
                "SELECT user_id, is_online, last_seen_at, updated_at FROM presence WHERE user_id = ?1",
                params![user_id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// All records ordered by user id.
    pub fn list(conn: &Connection) -> Result<Vec<PresenceRecord>> {
        let mut stmt = conn.prepare(
            "SELECT user_id, is_online, last_seen_at, updated_at FROM presence ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], RawRow::from_row)?;
        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.into_record()?);
        }
        Ok(records)
    }

    /// Flip every online row to offline at `at`. Returns rows changed.
    pub fn mark_all_offline(conn: &Connection, at: DateTime<Utc>) -> Result<usize> {
        let ts = format_ts(at);
        let changed = conn.execute(
            "UPDATE presence SET is_online = 0, last_seen_at = ?1, updated_at = ?1 WHERE is_online = 1",
            params![ts],
        )?;
        Ok(changed)
    }
}

struct RawRow {
    user_id: String,
    is_online: bool,
    last_seen_at: Option<String>,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            is_online: row.get::<_, i64>(1)? != 0,
            last_seen_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<PresenceRecord> {
        let last_seen_at = self
            .last_seen_at
            .as_deref()
            .map(|v| parse_ts(&self.user_id, v))
            .transpose()?;
        let updated_at = parse_ts(&self.user_id, &self.updated_at)?;
        Ok(PresenceRecord {
            user_id: self.user_id.into(),
            is_online: self.is_online,
            last_seen_at,
            updated_at,
        })
    }
}

fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(user_id: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PresenceStoreError::CorruptTimestamp {
            user_id: user_id.to_owned(),
            value: value.to_owned(),
        })
}
