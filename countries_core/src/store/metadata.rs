//! Refresh metadata: a single `last_refreshed_at` key/value row.
//!
//! The timestamp is only ever written through a connection that belongs to the
//! reconciliation transaction, so it commits or rolls back with the records.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

pub const LAST_REFRESHED_KEY: &str = "last_refreshed_at";

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| Error::backend("metadata schema", e))?;
    Ok(())
}

/// Upsert the refresh timestamp on the caller's (transactional) connection.
#[tracing::instrument(level = "debug", skip(conn))]
pub async fn set_last_refreshed(conn: &mut SqliteConnection, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(LAST_REFRESHED_KEY)
    .bind(format_ts(at))
    .execute(conn)
    .await
    .map_err(|e| Error::backend("set last_refreshed_at", e))?;
    Ok(())
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn last_refreshed(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query("SELECT value FROM metadata WHERE key = ?1")
        .bind(LAST_REFRESHED_KEY)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::backend("get last_refreshed_at", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let value: String = row.get("value");
    let ts = value
        .parse::<DateTime<Utc>>()
        .map_err(|e| Error::backend("parse last_refreshed_at", e))?;
    Ok(Some(ts))
}
