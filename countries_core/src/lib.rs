//! Country catalog refresh: fetch, estimate, reconcile, and summarize.

pub mod config;
pub mod error;
pub mod estimator;
pub mod models;
pub mod o11y;
pub mod reconcile;
pub mod refresh;
pub mod render;
pub mod sources;
pub mod store;

pub use config::{RefreshConfig, RenderConfig};
pub use error::{Error, Result};
pub use estimator::{FixedMultiplier, MultiplierSource, RandomMultiplier};
pub use models::{
    CountryQuery, CountryRecord, CountrySort, ExchangeRateTable, RawSourceRecord, StoreStatus,
    ValidationFault,
};
pub use reconcile::{Reconciliation, ReconciliationEngine};
pub use refresh::engine::RefreshOrchestrator;
pub use refresh::models::{RefreshError, RefreshState, RefreshSummary};
pub use render::png::PngSummaryRenderer;
pub use render::traits::{SummaryInput, SummaryRenderer};
pub use sources::client::{ExternalSourceClient, SourceSnapshot, SourceUnavailable};
pub use sources::traits::{CatalogSource, RateSource, SourceKind};
pub use store::sqlite::SqliteCountryStore;
pub use store::traits::CountryStore;
