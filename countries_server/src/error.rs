use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use countries_core::{Error as CoreError, RefreshError, ValidationFault};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Records committed by a refresh that still reported faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_countries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl ErrorBody {
    fn new(error: &str, details: Option<Value>) -> Self {
        Self {
            error: error.to_string(),
            details,
            ..Self::default()
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Request-level field errors, `field -> reason`.
    #[error("validation failed")]
    InvalidRequest(Map<String, Value>),

    #[error("summary image not found")]
    ImageNotFound,

    #[error("{0}")]
    Refresh(#[from] RefreshError),

    #[error("{0}")]
    Core(#[from] CoreError),
}

impl ApiError {
    pub fn required(field: &str) -> Self {
        let mut details = Map::new();
        details.insert(field.to_string(), Value::String("is required".to_string()));
        ApiError::InvalidRequest(details)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageNotFound => StatusCode::NOT_FOUND,
            ApiError::Refresh(err) => match err {
                RefreshError::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RefreshError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
                RefreshError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Core(err) => match err {
                CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Backend { .. } | CoreError::BackendMessage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Wire body. Internal failures never leak their cause.
    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::InvalidRequest(details) => {
                ErrorBody::new("Validation failed", Some(Value::Object(details.clone())))
            }
            ApiError::ImageNotFound => ErrorBody::new("Summary image not found", None),
            ApiError::Refresh(RefreshError::SourceUnavailable { source_kind }) => ErrorBody::new(
                "External data source unavailable",
                Some(Value::String(format!(
                    "Could not fetch data from {}",
                    source_kind.display_name()
                ))),
            ),
            ApiError::Refresh(RefreshError::ValidationFailed { summary, faults }) => ErrorBody {
                total_countries: Some(summary.total),
                last_refreshed_at: Some(summary.refreshed_at),
                ..ErrorBody::new("Validation failed", Some(fault_details(faults)))
            },
            ApiError::Core(CoreError::NotFound(what)) => ErrorBody::new(what, None),
            ApiError::Core(CoreError::InvalidInput(msg)) => {
                ErrorBody::new("Validation failed", Some(Value::String(msg.clone())))
            }
            ApiError::Refresh(RefreshError::PersistenceFailure(_))
            | ApiError::Core(CoreError::Backend { .. })
            | ApiError::Core(CoreError::BackendMessage(_)) => {
                ErrorBody::new("Internal server error", None)
            }
        }
    }
}

/// `{subject: {field: reason}}`. Subjects that repeat keep the last entry.
fn fault_details(faults: &[ValidationFault]) -> Value {
    let mut out = Map::new();
    for fault in faults {
        let fields = fault
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        out.insert(fault.subject.clone(), Value::Object(fields));
    }
    Value::Object(out)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (code, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countries_core::{RefreshSummary, SourceKind};
    use std::collections::BTreeMap;

    #[test]
    fn source_unavailable_names_the_source() {
        let err = ApiError::from(RefreshError::SourceUnavailable {
            source_kind: SourceKind::Rates,
        });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": "External data source unavailable",
                "details": "Could not fetch data from Exchange Rates API",
            })
        );
    }

    #[test]
    fn validation_failure_lists_faults_by_subject() {
        let refreshed_at: DateTime<Utc> = "2026-04-01T08:30:00.000250Z".parse().unwrap();
        let err = ApiError::from(RefreshError::ValidationFailed {
            summary: RefreshSummary {
                total: 2,
                refreshed_at,
            },
            faults: vec![ValidationFault {
                subject: "Belize".to_string(),
                fields: BTreeMap::from([("population".to_string(), "is required".to_string())]),
            }],
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["details"]["Belize"]["population"], "is required");
        assert_eq!(body["total_countries"], 2);
        assert_eq!(body["last_refreshed_at"], "2026-04-01T08:30:00.000250Z");
    }

    #[test]
    fn backend_errors_are_opaque() {
        let err = ApiError::from(RefreshError::PersistenceFailure(CoreError::BackendMessage(
            "disk I/O error".to_string(),
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Internal server error" }));
    }
}
