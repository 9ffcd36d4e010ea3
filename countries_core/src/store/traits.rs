use crate::Result;
use crate::models::{CountryQuery, CountryRecord, StoreStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A validated country ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCountry {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: i64,
    pub currency_code: Option<String>,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
}

/// Where an upsert lands: an already stored row (by surrogate id) or a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertTarget {
    Existing(i64),
    New,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRow {
    pub target: UpsertTarget,
    pub country: ValidCountry,
}

/// Rows written together with the metadata timestamp in one transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpsertBatch {
    pub rows: Vec<UpsertRow>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Persistence capability used by the reconciliation engine and the read-side routes.
#[async_trait]
pub trait CountryStore: Send + Sync {
    /// Idempotent schema bootstrap (countries + metadata).
    async fn ensure_schema(&self) -> Result<()>;

    /// Case-folded name (see `models::name_key`) → surrogate id, for every stored row.
    async fn load_name_index(&self) -> Result<HashMap<String, i64>>;

    /// Write `batch` and set `last_refreshed_at` atomically.
    ///
    /// Either every row and the metadata timestamp are committed, or nothing is.
    async fn apply_batch(
        &self,
        batch: &UpsertBatch,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Vec<CountryRecord>>;

    async fn list_countries(&self, query: &CountryQuery) -> Result<Vec<CountryRecord>>;

    /// Case-insensitive lookup by name.
    async fn get_country(&self, name: &str) -> Result<Option<CountryRecord>>;

    /// Case-insensitive delete by name. Returns whether a row was removed.
    async fn delete_country(&self, name: &str) -> Result<bool>;

    async fn status(&self) -> Result<StoreStatus>;
}
