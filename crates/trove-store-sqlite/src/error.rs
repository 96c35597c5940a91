//! Error type for `trove-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] trove_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a discriminant string no enum variant matches.
  #[error("unknown discriminant: {0}")]
  Decode(String),

  #[error("transfer not found: {0}")]
  TransferNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
