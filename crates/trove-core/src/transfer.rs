//! Durable work items for asynchronous storage transfers.
//!
//! When the storage service answers an upload with a redirect, the byte
//! buffer still has to reach the redirect target. That hand-off is recorded
//! here as a queued work item before the original request returns, so a
//! process restart re-runs interrupted transfers instead of dropping them.
//! Workers claim due items, attempt the transfer, and either complete the
//! item or reschedule it with backoff until it exhausts its attempts.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a transfer work item. `Failed` items are retried after a
/// backoff delay; `Dead` items have exhausted their attempts and need
/// operator attention. `Completed` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Dead,
}

impl TransferStatus {
  /// The discriminant string stored in the `status` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Dead => "dead",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(Self::Pending),
      "running" => Some(Self::Running),
      "completed" => Some(Self::Completed),
      "failed" => Some(Self::Failed),
      "dead" => Some(Self::Dead),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Completed | Self::Dead)
  }
}

/// A queued transfer. Carries everything a worker needs to finish the
/// upload and to notify the originating user afterwards, including the full
/// byte buffer.
#[derive(Debug, Clone)]
pub struct Transfer {
  pub id:            Uuid,
  pub record_key:    Uuid,
  pub org_id:        String,
  /// Identity-provider id of the user to notify on completion.
  pub user_id:       String,
  /// Redirect target the bytes must be streamed to.
  pub target_url:    String,
  /// Provisional identity issued by the storage service alongside the
  /// redirect; echoed back in the completion notification.
  pub document_id:   String,
  pub document_name: String,
  pub content_type:  String,
  pub body:          Vec<u8>,
  pub attempts:      u32,
  pub max_attempts:  u32,
  pub status:        TransferStatus,
  pub last_error:    Option<String>,
  /// Earliest time a worker may claim the item again.
  pub next_run_at:   DateTime<Utc>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Input to [`TransferStore::enqueue`].
#[derive(Debug, Clone)]
pub struct NewTransfer {
  pub record_key:    Uuid,
  pub org_id:        String,
  pub user_id:       String,
  pub target_url:    String,
  pub document_id:   String,
  pub document_name: String,
  pub content_type:  String,
  pub body:          Vec<u8>,
  pub max_attempts:  u32,
}

/// Per-status item counts, for health reporting and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferCounts {
  pub pending:   u64,
  pub running:   u64,
  pub completed: u64,
  pub failed:    u64,
  pub dead:      u64,
}

/// Durable queue of transfer work items.
///
/// Claiming is atomic: `claim_due` flips matched items to `Running` in the
/// same statement that selects them, so two workers can never hold the same
/// item.
pub trait TransferStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new work item in `Pending` state, due immediately.
  fn enqueue(
    &self,
    input: NewTransfer,
  ) -> impl Future<Output = Result<Transfer, Self::Error>> + Send + '_;

  /// Claim up to `limit` items whose `next_run_at` has passed, oldest
  /// first, marking them `Running`.
  fn claim_due(
    &self,
    now: DateTime<Utc>,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<Transfer>, Self::Error>> + Send + '_;

  /// Mark a claimed item `Completed`.
  fn complete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record a failed attempt. The item is rescheduled with exponential
  /// backoff, or marked `Dead` once its attempts are exhausted. Returns the
  /// updated item so the caller can see which of the two happened.
  fn fail<'a>(
    &'a self,
    id: Uuid,
    error: &'a str,
  ) -> impl Future<Output = Result<Transfer, Self::Error>> + Send + 'a;

  /// Flip items stuck in `Running` back to `Pending`. Called once at
  /// startup to recover transfers interrupted by a crash or restart.
  /// Returns how many items were recovered.
  fn requeue_interrupted(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn counts(
    &self,
  ) -> impl Future<Output = Result<TransferCounts, Self::Error>> + Send + '_;
}
