//! Handlers for the `/api/v1/notifications` push-dispatch endpoints.
//!
//! | Method | Path                     | Notes                                |
//! |--------|--------------------------|--------------------------------------|
//! | `POST` | `/notify/user/{userId}`  | 404 when the user has no connection  |
//! | `POST` | `/notify/org/{orgId}`    | 404 when no member is connected      |
//! | `POST` | `/notify/broadcast`      | Always 200; reports delivered count  |
//!
//! The body is a push command: `{"event": "...", "data": {...}}`. Dispatch
//! is fire-and-forget into live websocket connections; nothing is persisted
//! here.

use axum::{
  Json,
  extract::{Path, State},
};
use serde_json::{Value, json};
use trove_core::event::PushCommand;

use crate::{AppState, error::ApiError};

/// `POST /notify/user/{userId}`
pub async fn notify_user<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
  Json(command): Json<PushCommand>,
) -> Result<Json<Value>, ApiError>
where
  S: Clone + Send + Sync + 'static,
{
  if state.gateway.send_to_user(&user_id, &command.event, &command.data) {
    Ok(Json(json!({ "delivered": true })))
  } else {
    Err(ApiError::NotFound(format!(
      "no live connection for user {user_id}"
    )))
  }
}

/// `POST /notify/org/{orgId}`
pub async fn notify_org<S>(
  State(state): State<AppState<S>>,
  Path(org_id): Path<String>,
  Json(command): Json<PushCommand>,
) -> Result<Json<Value>, ApiError>
where
  S: Clone + Send + Sync + 'static,
{
  if state.gateway.send_to_org(&org_id, &command.event, &command.data) {
    Ok(Json(json!({ "delivered": true })))
  } else {
    Err(ApiError::NotFound(format!(
      "no live connection for org {org_id}"
    )))
  }
}

/// `POST /notify/broadcast`
pub async fn notify_broadcast<S>(
  State(state): State<AppState<S>>,
  Json(command): Json<PushCommand>,
) -> Result<Json<Value>, ApiError>
where
  S: Clone + Send + Sync + 'static,
{
  let delivered = state.gateway.broadcast_to_all(&command.event, &command.data);
  Ok(Json(json!({ "delivered": delivered })))
}
