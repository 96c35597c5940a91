//! Caller identity extracted from forwarded headers.
//!
//! Authentication terminates upstream; this service trusts the identity
//! headers the gateway forwards alongside each request.

use axum::{
  extract::FromRequestParts,
  http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORG_ID_HEADER: &str = "x-org-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The caller a request runs on behalf of.
#[derive(Debug, Clone)]
pub struct UserContext {
  pub user_id:       String,
  pub org_id:        String,
  pub email:         Option<String>,
  /// Original authorization header, forwarded on storage-service calls.
  pub authorization: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for UserContext {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let user_id = require_header(parts, USER_ID_HEADER)?;
    let org_id = require_header(parts, ORG_ID_HEADER)?;
    let email = optional_header(parts, USER_EMAIL_HEADER);
    let authorization = parts
      .headers
      .get(AUTHORIZATION)
      .and_then(|value| value.to_str().ok())
      .map(str::to_owned);
    Ok(Self { user_id, org_id, email, authorization })
  }
}

fn require_header(parts: &Parts, name: &str) -> Result<String, ApiError> {
  optional_header(parts, name).ok_or_else(|| {
    ApiError::BadRequest(format!("missing or empty `{name}` header"))
  })
}

fn optional_header(parts: &Parts, name: &str) -> Option<String> {
  parts
    .headers
    .get(name)
    .and_then(|value| value.to_str().ok())
    .filter(|value| !value.is_empty())
    .map(str::to_owned)
}
