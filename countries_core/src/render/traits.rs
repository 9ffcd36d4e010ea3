use crate::Result;
use crate::models::CountryRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::PathBuf;

pub const TOP_N: usize = 5;

/// What the summary image shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryInput {
    /// At most `TOP_N` records, estimated GDP descending, never `None` GDP.
    pub top: Vec<CountryRecord>,
    pub total: u64,
    pub refreshed_at: DateTime<Utc>,
}

impl SummaryInput {
    pub fn from_committed(committed: &[CountryRecord], refreshed_at: DateTime<Utc>) -> Self {
        Self {
            top: top_by_gdp(committed, TOP_N),
            total: committed.len() as u64,
            refreshed_at,
        }
    }
}

/// Highest `n` records by estimated GDP; unknown estimates are left out.
pub fn top_by_gdp(records: &[CountryRecord], n: usize) -> Vec<CountryRecord> {
    let mut known: Vec<&CountryRecord> = records
        .iter()
        .filter(|r| r.estimated_gdp.is_some_and(f64::is_finite))
        .collect();
    known.sort_by(|a, b| {
        b.estimated_gdp
            .partial_cmp(&a.estimated_gdp)
            .unwrap_or(Ordering::Equal)
    });
    known.into_iter().take(n).cloned().collect()
}

#[async_trait]
pub trait SummaryRenderer: Send + Sync {
    /// Render and store the artifact, returning where it was written.
    async fn render(&self, summary: &SummaryInput) -> Result<PathBuf>;
}
