//! SQLite-backed `CountryStore`.
//!
//! Single WAL-mode file. Each row carries `name_key`, the Unicode case-folded
//! name from `models::name_key`, and that column is unique. SQLite's NOCASE only
//! folds ASCII, so lookups and deletes go through the key, never through `name`.
//! The reconciliation engine resolves matches by the same key before writing,
//! so the index only has to catch races between overlapping refreshes.
//!
//! Usage:
//! ```ignore
//! let store = SqliteCountryStore::new("/var/lib/countries/countries.db").await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::models::{CountryQuery, CountryRecord, CountrySort, StoreStatus, name_key};
use crate::store::metadata::{self, format_ts};
use crate::store::traits::{CountryStore, UpsertBatch, UpsertTarget, ValidCountry};
use crate::{Error, Result};

#[derive(Clone)]
pub struct SqliteCountryStore {
    pool: SqlitePool,
}

impl SqliteCountryStore {
    /// Create (or open) the store at `path` and bootstrap the schema.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend("sqlite_country_store mkdir", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(|e| Error::backend("sqlite_country_store connect options", e))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::backend("sqlite_country_store connect", e))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS countries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL,
    capital TEXT,
    region TEXT,
    population INTEGER NOT NULL CHECK (population >= 0),
    currency_code TEXT,
    exchange_rate REAL,
    estimated_gdp REAL,
    flag_url TEXT,
    last_refreshed_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS countries_name_key_idx ON countries(name_key);
CREATE INDEX IF NOT EXISTS countries_region_idx ON countries(region COLLATE NOCASE);
"#;

const COLUMNS: &str = "id, name, capital, region, population, currency_code, exchange_rate, \
                       estimated_gdp, flag_url, last_refreshed_at";

fn db_err(e: sqlx::Error) -> Error {
    Error::backend("sqlite_country_store", e)
}

async fn update_row(
    conn: &mut SqliteConnection,
    id: i64,
    c: &ValidCountry,
    refreshed_at: &str,
) -> Result<Option<String>> {
    // The stored name keeps its original casing.
    let row = sqlx::query(
        "UPDATE countries
            SET capital = ?2, region = ?3, population = ?4, currency_code = ?5,
                exchange_rate = ?6, estimated_gdp = ?7, flag_url = ?8, last_refreshed_at = ?9
          WHERE id = ?1
         RETURNING name",
    )
    .bind(id)
    .bind(&c.capital)
    .bind(&c.region)
    .bind(c.population)
    .bind(&c.currency_code)
    .bind(c.exchange_rate)
    .bind(c.estimated_gdp)
    .bind(&c.flag_url)
    .bind(refreshed_at)
    .fetch_optional(conn)
    .await
    .map_err(db_err)?;
    Ok(row.map(|r| r.get("name")))
}

async fn insert_row(
    conn: &mut SqliteConnection,
    c: &ValidCountry,
    refreshed_at: &str,
) -> Result<i64> {
    let res = sqlx::query(
        "INSERT INTO countries
            (name, capital, region, population, currency_code, exchange_rate,
             estimated_gdp, flag_url, last_refreshed_at, name_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(&c.name)
    .bind(&c.capital)
    .bind(&c.region)
    .bind(c.population)
    .bind(&c.currency_code)
    .bind(c.exchange_rate)
    .bind(c.estimated_gdp)
    .bind(&c.flag_url)
    .bind(refreshed_at)
    .bind(name_key(&c.name))
    .execute(conn)
    .await
    .map_err(db_err)?;
    Ok(res.last_insert_rowid())
}

#[async_trait]
impl CountryStore for SqliteCountryStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::backend("sqlite_country_store schema", e))?;
        metadata::ensure_schema(&self.pool).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn load_name_index(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, name_key FROM countries")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("name_key"), r.get::<i64, _>("id")))
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self, batch), fields(rows = batch.len()))]
    async fn apply_batch(
        &self,
        batch: &UpsertBatch,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Vec<CountryRecord>> {
        let stamp = format_ts(refreshed_at);
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut committed = Vec::with_capacity(batch.len());

        for row in &batch.rows {
            let c = &row.country;
            let (id, name) = match row.target {
                UpsertTarget::Existing(id) => match update_row(&mut *tx, id, c, &stamp).await? {
                    Some(stored_name) => (id, stored_name),
                    // Row vanished since the name index was loaded.
                    None => (insert_row(&mut *tx, c, &stamp).await?, c.name.clone()),
                },
                UpsertTarget::New => (insert_row(&mut *tx, c, &stamp).await?, c.name.clone()),
            };
            committed.push(CountryRecord {
                id,
                name,
                capital: c.capital.clone(),
                region: c.region.clone(),
                population: c.population,
                currency_code: c.currency_code.clone(),
                exchange_rate: c.exchange_rate,
                estimated_gdp: c.estimated_gdp,
                flag_url: c.flag_url.clone(),
                last_refreshed_at: refreshed_at,
            });
        }

        metadata::set_last_refreshed(&mut *tx, refreshed_at).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(committed)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_countries(&self, query: &CountryQuery) -> Result<Vec<CountryRecord>> {
        let order = match query.sort {
            Some(CountrySort::GdpDesc) => "estimated_gdp IS NULL, estimated_gdp DESC, id",
            Some(CountrySort::GdpAsc) => "estimated_gdp IS NULL, estimated_gdp ASC, id",
            Some(CountrySort::PopulationDesc) => "population DESC, id",
            Some(CountrySort::PopulationAsc) => "population ASC, id",
            None => "id",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM countries
              WHERE (?1 IS NULL OR region = ?1 COLLATE NOCASE)
                AND (?2 IS NULL OR currency_code = ?2 COLLATE NOCASE)
              ORDER BY {order}"
        );

        let rows = sqlx::query(&sql)
            .bind(query.region.as_deref().map(str::trim))
            .bind(query.currency.as_deref().map(str::trim))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(row_to_country).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_country(&self, name: &str) -> Result<Option<CountryRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM countries WHERE name_key = ?1"))
            .bind(name_key(name))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_country).transpose()
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn delete_country(&self, name: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM countries WHERE name_key = ?1")
            .bind(name_key(name))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn status(&self) -> Result<StoreStatus> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM countries")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(StoreStatus {
            total_countries: total.max(0) as u64,
            last_refreshed_at: metadata::last_refreshed(&self.pool).await?,
        })
    }
}

// ── Row mapping ─────────────────────────────────────────────────

fn row_to_country(r: &SqliteRow) -> Result<CountryRecord> {
    let refreshed_str: String = r.get("last_refreshed_at");
    let last_refreshed_at = refreshed_str
        .parse::<DateTime<Utc>>()
        .map_err(|e| Error::backend("parse countries.last_refreshed_at", e))?;

    Ok(CountryRecord {
        id: r.get("id"),
        name: r.get("name"),
        capital: r.get("capital"),
        region: r.get("region"),
        population: r.get("population"),
        currency_code: r.get("currency_code"),
        exchange_rate: r.get("exchange_rate"),
        estimated_gdp: r.get("estimated_gdp"),
        flag_url: r.get("flag_url"),
        last_refreshed_at,
    })
}
