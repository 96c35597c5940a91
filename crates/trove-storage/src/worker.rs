//! Background worker for queued storage transfers.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future;
use reqwest::{Client, header::CONTENT_TYPE};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use trove_core::transfer::{Transfer, TransferStatus, TransferStore};
use uuid::Uuid;

use crate::{
  Result,
  notify::{NotifierClient, TransferOutcome},
};

/// Event name for transfer-completion notifications.
pub const UPLOAD_STATUS_EVENT: &str = "uploadStatus";

/// Claims due transfers from the queue and drives each one to a verdict.
///
/// Claiming is atomic, so any number of workers may poll the same queue; a
/// claimed batch is transferred concurrently. Terminal transitions
/// (completed or dead) notify the uploader; scheduled retries are silent.
pub struct TransferWorker<S> {
  transfers:     Arc<S>,
  notifier:      NotifierClient,
  client:        Client,
  poll_interval: Duration,
  batch_size:    u32,
}

impl<S: TransferStore> TransferWorker<S> {
  pub fn new(transfers: Arc<S>, notifier: NotifierClient) -> Result<Self> {
    // Transfer bodies can be arbitrarily large; no overall timeout.
    let client = Client::builder().build()?;
    Ok(Self {
      transfers,
      notifier,
      client,
      poll_interval: Duration::from_secs(1),
      batch_size: 4,
    })
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn with_batch_size(mut self, n: u32) -> Self {
    self.batch_size = n.max(1);
    self
  }

  /// Run the polling loop until a shutdown signal arrives.
  pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
    info!(
      poll_ms = self.poll_interval.as_millis() as u64,
      batch_size = self.batch_size,
      "transfer worker started"
    );

    loop {
      tokio::select! {
        _ = shutdown.recv() => {
          info!("transfer worker shutting down");
          break;
        }
        _ = tokio::time::sleep(self.poll_interval) => {
          self.tick().await;
        }
      }
    }
  }

  /// Claim one batch of due transfers and run them all.
  pub(crate) async fn tick(&self) {
    let batch =
      match self.transfers.claim_due(Utc::now(), self.batch_size).await {
        Ok(batch) => batch,
        Err(err) => {
          error!(error = %err, "claiming transfers failed");
          return;
        }
      };

    future::join_all(batch.into_iter().map(|t| self.process(t))).await;
  }

  async fn process(&self, transfer: Transfer) {
    let Transfer {
      id,
      user_id,
      target_url,
      document_id,
      document_name,
      content_type,
      body,
      ..
    } = transfer;

    let result = self
      .client
      .put(&target_url)
      .header(CONTENT_TYPE, content_type)
      .body(body)
      .send()
      .await;

    match result {
      Ok(resp) if resp.status().is_success() => {
        let status = resp.status().as_u16();
        if let Err(err) = self.transfers.complete(id).await {
          error!(transfer = %id, error = %err, "failed to mark transfer complete");
        }
        self
          .notifier
          .notify_user(&user_id, UPLOAD_STATUS_EVENT, &TransferOutcome {
            document_id,
            document_name,
            status,
          })
          .await;
      }
      Ok(resp) => {
        let status = resp.status().as_u16();
        let message = format!("transfer target answered {status}");
        self
          .record_failure(id, &user_id, document_id, document_name, status, &message)
          .await;
      }
      Err(err) => {
        // Transport-level failure; reported as a bare 500.
        self
          .record_failure(
            id,
            &user_id,
            document_id,
            document_name,
            500,
            &err.to_string(),
          )
          .await;
      }
    }
  }

  /// Book a failed attempt. If that exhausted the item's attempts the
  /// uploader gets the final status; otherwise the retry stays silent.
  async fn record_failure(
    &self,
    id: Uuid,
    user_id: &str,
    document_id: String,
    document_name: String,
    status: u16,
    message: &str,
  ) {
    match self.transfers.fail(id, message).await {
      Ok(updated) if updated.status == TransferStatus::Dead => {
        warn!(transfer = %id, status, "transfer exhausted its attempts");
        self
          .notifier
          .notify_user(user_id, UPLOAD_STATUS_EVENT, &TransferOutcome {
            document_id,
            document_name,
            status,
          })
          .await;
      }
      Ok(updated) => {
        warn!(
          transfer = %id,
          attempts = updated.attempts,
          next_run_at = %updated.next_run_at,
          "transfer failed, retry scheduled"
        );
      }
      Err(err) => {
        error!(transfer = %id, error = %err, "failed to record transfer failure");
      }
    }
  }
}
