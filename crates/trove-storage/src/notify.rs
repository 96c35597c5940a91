//! Best-effort push of transfer outcomes to the notification service.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::Result;

/// Completion payload delivered to the uploader once a transfer reaches a
/// terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
  pub document_id:   String,
  pub document_name: String,
  /// Final HTTP status of the transfer; 500 when the failure was
  /// transport-level.
  pub status:        u16,
}

#[derive(Serialize)]
struct PushBody<'a> {
  event: &'a str,
  data:  &'a TransferOutcome,
}

/// Fire-and-forget client for the notification service's per-user push
/// endpoint. Delivery failures are logged and swallowed: a notification is
/// never allowed to fail the operation that triggered it.
#[derive(Clone)]
pub struct NotifierClient {
  client:   Client,
  endpoint: String,
}

impl NotifierClient {
  pub fn new(endpoint: impl Into<String>) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, endpoint: endpoint.into() })
  }

  /// `POST /api/v1/notifications/notify/user/{userId}`
  pub async fn notify_user(
    &self,
    user_id: &str,
    event: &str,
    data: &TransferOutcome,
  ) {
    let url = format!(
      "{}/api/v1/notifications/notify/user/{user_id}",
      self.endpoint.trim_end_matches('/')
    );
    let result =
      self.client.post(&url).json(&PushBody { event, data }).send().await;

    match result {
      Ok(resp) if !resp.status().is_success() => {
        warn!(user = user_id, status = %resp.status(), "notification rejected");
      }
      Err(err) => {
        warn!(user = user_id, error = %err, "notification delivery failed");
      }
      Ok(_) => {}
    }
  }
}
