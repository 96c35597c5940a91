//! Error types for `trove-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found in org {org_id}: {user_id}")]
  UserNotFound { org_id: String, user_id: String },

  #[error("no knowledge base for org: {0}")]
  KnowledgeBaseNotFound(String),

  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("file record not found: {0}")]
  FileRecordNotFound(Uuid),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("field is immutable: {0}")]
  ImmutableField(String),

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("upstream storage error: {0}")]
  Upstream(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend-specific store error. The service layer uses this to
  /// erase the concrete store's error type at the domain boundary.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
