//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// The storage service failed or answered with something unexpected.
  #[error("upstream failure: {0}")]
  Upstream(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<trove_core::Error> for ApiError {
  fn from(err: trove_core::Error) -> Self {
    use trove_core::Error as E;
    match err {
      E::Validation(_) | E::ImmutableField(_) => {
        Self::BadRequest(err.to_string())
      }
      E::PermissionDenied(_) => Self::Forbidden(err.to_string()),
      E::UserNotFound { .. }
      | E::KnowledgeBaseNotFound(_)
      | E::RecordNotFound(_)
      | E::FileRecordNotFound(_) => Self::NotFound(err.to_string()),
      E::Upstream(_) => Self::Upstream(err.to_string()),
      E::Serialization(e) => Self::Internal(Box::new(e)),
      E::Store(e) => Self::Internal(e),
    }
  }
}

impl From<trove_storage::Error> for ApiError {
  fn from(err: trove_storage::Error) -> Self {
    Self::Upstream(err.to_string())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Internal(e) => {
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
