use crate::Result;
use crate::models::{ExchangeRateTable, RawSourceRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which of the two upstream sources an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Catalog,
    Rates,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Catalog => "catalog",
            SourceKind::Rates => "rates",
        }
    }

    /// Human-facing upstream name, used in caller-facing error details.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Catalog => "RESTCountries API",
            SourceKind::Rates => "Exchange Rates API",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pulls the full country catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Vec<RawSourceRecord>>;
}

/// Pulls the current exchange-rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self) -> Result<ExchangeRateTable>;
}
