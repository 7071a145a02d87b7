use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use color_eyre::eyre::{self, eyre};
use db::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error on its way to becoming an HTTP response: the report, the status
/// to answer with and, for validation failures, the offending field.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServerError(
    pub(crate) eyre::Report,
    pub(crate) StatusCode,
    pub(crate) Option<&'static str>,
);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: String,
    pub field: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let ServerError(report, status, field) = self;

        let detail = if status.is_server_error() {
            tracing::error!(error = ?report, status = status.as_u16(), "Request failed");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %report, status = status.as_u16(), "Request rejected");
            report.to_string()
        };

        let body = ErrorBody {
            detail,
            field: field.map(str::to_string),
        };

        (status, Json(body)).into_response()
    }
}

impl From<eyre::Report> for ServerError {
    fn from(err: eyre::Report) -> Self {
        ServerError(err, StatusCode::INTERNAL_SERVER_ERROR, None)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        let (status, field) = match &err {
            StoreError::Validation { field, .. } => (StatusCode::BAD_REQUEST, Some(*field)),
            StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
            StoreError::Conflict(_) => (StatusCode::CONFLICT, None),
            StoreError::Consistency(_) | StoreError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let report = match err {
            StoreError::Validation { message, .. } => eyre!(message),
            other => eyre::Report::new(other),
        };

        ServerError(report, status, field)
    }
}

pub(crate) trait WithStatus<T> {
    fn with_status(self, status: StatusCode) -> Result<T, ServerError>;
}

impl<T, E> WithStatus<T> for Result<T, E>
where
    E: Into<eyre::Report>,
{
    fn with_status(self, status: StatusCode) -> Result<T, ServerError> {
        self.map_err(|err| ServerError(err.into(), status, None))
    }
}
