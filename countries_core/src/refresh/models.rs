use crate::models::ValidationFault;
use crate::sources::client::SourceUnavailable;
use crate::sources::traits::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a committed cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    /// Records committed in this cycle.
    pub total: u64,
    pub refreshed_at: DateTime<Utc>,
}

/// Stages of a refresh cycle, in order. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Fetching,
    Deriving,
    Reconciling,
    Committed,
    Rendering,
    Done,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshState::Fetching => "fetching",
            RefreshState::Deriving => "deriving",
            RefreshState::Reconciling => "reconciling",
            RefreshState::Committed => "committed",
            RefreshState::Rendering => "rendering",
            RefreshState::Done => "done",
        }
    }
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    /// A source failed or timed out. Nothing was written.
    #[error("external data source unavailable: {source_kind}")]
    SourceUnavailable { source_kind: SourceKind },

    /// Some records were rejected. The valid subset is committed and `summary`
    /// describes it.
    #[error("{} record(s) failed validation", .faults.len())]
    ValidationFailed {
        summary: RefreshSummary,
        faults: Vec<ValidationFault>,
    },

    /// The reconciliation transaction failed and was rolled back.
    #[error("persistence failure")]
    PersistenceFailure(#[source] crate::Error),
}

impl From<SourceUnavailable> for RefreshError {
    fn from(e: SourceUnavailable) -> Self {
        RefreshError::SourceUnavailable {
            source_kind: e.source_kind,
        }
    }
}
