//! HTTP surface of the records service.
//!
//! Exposes an axum [`Router`] speaking the knowledge-base record API, the
//! push-dispatch API, and the live websocket endpoint, backed by any store
//! implementing the `trove-core` traits. Auth and TLS terminate upstream;
//! callers arrive as forwarded identity headers.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = trove_api::api_router(state);
//! ```

pub mod context;
pub mod error;
pub mod notifications;
pub mod records;
pub mod upload;
pub mod ws;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, patch, post},
};
use trove_core::{event::EventStream, store::GraphStore, transfer::TransferStore};
use trove_notify::LiveGateway;
use trove_relations::RelationService;
use trove_storage::StorageClient;

pub use error::ApiError;

/// Requests with bodies larger than this are rejected before a handler runs.
pub const MAX_UPLOAD_BYTES: usize = 128 * 1024 * 1024;

/// Dependencies shared by every handler, assembled once at startup.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub relations: RelationService<S>,
  pub storage:   StorageClient,
  pub gateway:   Arc<LiveGateway>,
  /// Attempt budget stamped onto transfers enqueued for redirected uploads.
  pub transfer_max_attempts: u32,
}

/// Build the full API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  Router::new()
    // Knowledge-base records
    .route("/api/v1/knowledgeBase", post(records::create::<S>))
    .route("/api/v1/knowledgeBase/records", get(records::list::<S>))
    .route(
      "/api/v1/knowledgeBase/records/{id}",
      get(records::get_one::<S>)
        .put(records::update::<S>)
        .delete(records::delete_one::<S>),
    )
    .route(
      "/api/v1/knowledgeBase/records/{id}/archive",
      patch(records::archive::<S>),
    )
    .route(
      "/api/v1/knowledgeBase/records/{id}/unarchive",
      patch(records::unarchive::<S>),
    )
    // Push dispatch
    .route(
      "/api/v1/notifications/notify/user/{user_id}",
      post(notifications::notify_user::<S>),
    )
    .route(
      "/api/v1/notifications/notify/org/{org_id}",
      post(notifications::notify_org::<S>),
    )
    .route(
      "/api/v1/notifications/notify/broadcast",
      post(notifications::notify_broadcast::<S>),
    )
    // Live connections
    .route("/ws", get(ws::connect::<S>))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .with_state(state)
}

#[cfg(test)]
mod tests;
