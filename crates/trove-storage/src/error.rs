//! Error types for `trove-storage`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("storage service answered {status}: {body}")]
  UnexpectedStatus { status: u16, body: String },

  #[error("redirect response is missing the `{0}` header")]
  MissingHeader(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
