//! Event-stream and notification types.
//!
//! Record mutations are published onto a durable, ordered event stream. A
//! consumer drains the stream, persists each event as a notification, and
//! hands it to the live delivery gateway. Live delivery is best-effort and
//! strictly subordinate to persistence.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::record::{Origin, RecordType};

// ─── Event kinds ─────────────────────────────────────────────────────────────

/// The record lifecycle events this service publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordEventKind {
  NewRecord,
  UpdateRecord,
  DeleteRecord,
}

impl RecordEventKind {
  /// The event-name string carried on the wire.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NewRecord => "newRecord",
      Self::UpdateRecord => "updateRecord",
      Self::DeleteRecord => "deleteRecord",
    }
  }
}

/// Payload published with every record lifecycle event. Downstream services
/// (indexing, live delivery) read this; keep it additive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventData {
  pub org_id:      String,
  pub record_id:   Uuid,
  pub record_name: String,
  pub record_type: RecordType,
  pub origin:      Origin,
  pub version:     u32,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub extension:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub mime_type:   Option<String>,
}

// ─── Stream events ───────────────────────────────────────────────────────────

/// An event as stored on the stream. `seq` is assigned by the stream and is
/// strictly increasing; consumers use it as their commit cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
  pub seq:         u64,
  pub event:       String,
  pub org_id:      String,
  /// Identity-provider id of the user the event should be pushed to. Events
  /// without a target are persisted but not live-delivered.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub assigned_to: Option<String>,
  pub payload:     Value,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at:  DateTime<Utc>,
}

/// Input to [`EventStream::publish`].
#[derive(Debug, Clone)]
pub struct NewStreamEvent {
  pub event:       String,
  pub org_id:      String,
  pub assigned_to: Option<String>,
  pub payload:     Value,
}

/// A durable, ordered event stream with per-consumer commit cursors.
///
/// Fetch-then-commit gives at-least-once delivery: a consumer that crashes
/// between the two re-reads the same events on restart.
pub trait EventStream: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append an event and return it with its assigned sequence number.
  fn publish(
    &self,
    input: NewStreamEvent,
  ) -> impl Future<Output = Result<StreamEvent, Self::Error>> + Send + '_;

  /// Events with `seq` strictly greater than `after`, oldest first, up to
  /// `limit`.
  fn fetch_after(
    &self,
    after: u64,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<StreamEvent>, Self::Error>> + Send + '_;

  /// Record that `consumer` has fully processed everything up to and
  /// including `seq`.
  fn commit<'a>(
    &'a self,
    consumer: &'a str,
    seq: u64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The last committed sequence number for `consumer`; 0 if it has never
  /// committed.
  fn committed<'a>(
    &'a self,
    consumer: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// A persisted notification. Append-only; there is no update or delete path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id:         Uuid,
  /// Stream position the notification was consumed from.
  pub seq:        u64,
  pub org_id:     String,
  pub user_id:    String,
  pub event:      String,
  pub payload:    Value,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at: DateTime<Utc>,
}

/// Input to [`NotificationStore::append`].
#[derive(Debug, Clone)]
pub struct NewNotification {
  pub seq:     u64,
  pub org_id:  String,
  pub user_id: String,
  pub event:   String,
  pub payload: Value,
}

/// Append-only persistence for notifications.
pub trait NotificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist one consumed stream event. Appending a stream position that is
  /// already stored returns the existing row unchanged, so an at-least-once
  /// consumer can replay after a crash without duplicating notifications.
  fn append(
    &self,
    input: NewNotification,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;

  /// A user's notifications, newest first, up to `limit`.
  fn list_for_user<'a>(
    &'a self,
    org_id: &'a str,
    user_id: &'a str,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + 'a;
}

// ─── Push commands ───────────────────────────────────────────────────────────

/// Body of a live-push command: an event name plus opaque data. Used both by
/// the outbound dispatch client and the inbound notify API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCommand {
  pub event: String,
  pub data:  Value,
}
