//! [`TransferStore`] implementation — the durable queue of asynchronous
//! storage transfers.
//!
//! Claiming happens inside a transaction so an item can only ever be handed
//! to one worker. Failed attempts reschedule with exponential backoff until
//! `max_attempts` is reached, after which the item is parked as `dead`.

use chrono::{Duration, Utc};
use uuid::Uuid;

use trove_core::transfer::{
  NewTransfer, Transfer, TransferCounts, TransferStatus, TransferStore,
};

use crate::{
  Error, Result,
  encode::{RawTransfer, decode_transfer_status, encode_dt, encode_uuid},
  store::SqliteStore,
};

/// First retry delay; doubles per attempt.
const BACKOFF_BASE_SECS: u64 = 5;
/// Retry delay ceiling.
const BACKOFF_MAX_SECS: u64 = 3600;

const TRANSFER_COLS: &str = "id, record_key, org_id, user_id, target_url, \
   document_id, document_name, content_type, body, attempts, max_attempts, \
   status, last_error, next_run_at, created_at, updated_at";

fn backoff_secs(attempts: u32) -> u64 {
  let exp = attempts.saturating_sub(1).min(10);
  (BACKOFF_BASE_SECS << exp).min(BACKOFF_MAX_SECS)
}

impl TransferStore for SqliteStore {
  type Error = Error;

  async fn enqueue(&self, input: NewTransfer) -> Result<Transfer> {
    let now = Utc::now();
    let transfer = Transfer {
      id:            Uuid::new_v4(),
      record_key:    input.record_key,
      org_id:        input.org_id,
      user_id:       input.user_id,
      target_url:    input.target_url,
      document_id:   input.document_id,
      document_name: input.document_name,
      content_type:  input.content_type,
      body:          input.body,
      attempts:      0,
      max_attempts:  input.max_attempts,
      status:        TransferStatus::Pending,
      last_error:    None,
      next_run_at:   now,
      created_at:    now,
      updated_at:    now,
    };

    let t = transfer.clone();
    self
      .conn
      .call(move |conn| {
        let id_str  = encode_uuid(t.id);
        let rec_str = encode_uuid(t.record_key);
        let now_str = encode_dt(t.created_at);
        conn.execute(
          "INSERT INTO transfers (
             id, record_key, org_id, user_id, target_url, document_id,
             document_name, content_type, body, attempts, max_attempts,
             status, last_error, next_run_at, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?15)",
          rusqlite::params![
            id_str,
            rec_str,
            t.org_id,
            t.user_id,
            t.target_url,
            t.document_id,
            t.document_name,
            t.content_type,
            t.body,
            t.attempts as i64,
            t.max_attempts as i64,
            t.status.as_str(),
            t.last_error,
            now_str,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(transfer)
  }

  async fn claim_due(
    &self,
    now: chrono::DateTime<Utc>,
    limit: u32,
  ) -> Result<Vec<Transfer>> {
    let now_str = encode_dt(now);
    let limit   = limit as i64;

    let raws: Vec<RawTransfer> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {TRANSFER_COLS} FROM transfers
             WHERE status IN ('pending', 'failed') AND next_run_at <= ?1
             ORDER BY next_run_at ASC
             LIMIT ?2"
          ))?;
          stmt
            .query_map(rusqlite::params![now_str, limit], read_transfer_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        for raw in &mut rows {
          tx.execute(
            "UPDATE transfers SET status = 'running', updated_at = ?2
             WHERE id = ?1",
            rusqlite::params![raw.id, now_str],
          )?;
          raw.status = "running".to_owned();
          raw.updated_at = now_str.clone();
        }

        tx.commit()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTransfer::into_transfer).collect()
  }

  async fn complete(&self, id: Uuid) -> Result<()> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE transfers SET status = 'completed', updated_at = ?2
           WHERE id = ?1",
          rusqlite::params![id_str, now_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::TransferNotFound(id));
    }
    Ok(())
  }

  async fn fail(&self, id: Uuid, error: &str) -> Result<Transfer> {
    let id_str  = encode_uuid(id);
    let err_str = error.to_owned();
    let now     = Utc::now();
    let now_str = encode_dt(now);

    let raw: Option<RawTransfer> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let counters: Option<(i64, i64)> = {
          use rusqlite::OptionalExtension as _;
          tx.query_row(
            "SELECT attempts, max_attempts FROM transfers WHERE id = ?1",
            rusqlite::params![id_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?
        };
        let Some((attempts, max_attempts)) = counters else {
          return Ok(None);
        };

        let attempts = attempts as u32 + 1;
        let (status, next_run) = if attempts >= max_attempts as u32 {
          (TransferStatus::Dead, now)
        } else {
          let delay = Duration::seconds(backoff_secs(attempts) as i64);
          (TransferStatus::Failed, now + delay)
        };

        tx.execute(
          "UPDATE transfers SET
             attempts = ?2, status = ?3, last_error = ?4, next_run_at = ?5,
             updated_at = ?6
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            attempts as i64,
            status.as_str(),
            err_str,
            encode_dt(next_run),
            now_str,
          ],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {TRANSFER_COLS} FROM transfers WHERE id = ?1"),
          rusqlite::params![id_str],
          read_transfer_row,
        )?;

        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    match raw {
      Some(raw) => raw.into_transfer(),
      None => Err(Error::TransferNotFound(id)),
    }
  }

  async fn requeue_interrupted(&self) -> Result<u64> {
    let now_str = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE transfers SET status = 'pending', updated_at = ?1
           WHERE status = 'running'",
          rusqlite::params![now_str],
        )?)
      })
      .await?;

    Ok(changed as u64)
  }

  async fn counts(&self) -> Result<TransferCounts> {
    let pairs: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT status, COUNT(*) FROM transfers GROUP BY status")?;
        let rows = stmt
          .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = TransferCounts::default();
    for (status, n) in pairs {
      match decode_transfer_status(&status)? {
        TransferStatus::Pending => counts.pending = n as u64,
        TransferStatus::Running => counts.running = n as u64,
        TransferStatus::Completed => counts.completed = n as u64,
        TransferStatus::Failed => counts.failed = n as u64,
        TransferStatus::Dead => counts.dead = n as u64,
      }
    }
    Ok(counts)
  }
}

fn read_transfer_row(row: &rusqlite::Row) -> rusqlite::Result<RawTransfer> {
  Ok(RawTransfer {
    id:            row.get(0)?,
    record_key:    row.get(1)?,
    org_id:        row.get(2)?,
    user_id:       row.get(3)?,
    target_url:    row.get(4)?,
    document_id:   row.get(5)?,
    document_name: row.get(6)?,
    content_type:  row.get(7)?,
    body:          row.get(8)?,
    attempts:      row.get(9)?,
    max_attempts:  row.get(10)?,
    status:        row.get(11)?,
    last_error:    row.get(12)?,
    next_run_at:   row.get(13)?,
    created_at:    row.get(14)?,
    updated_at:    row.get(15)?,
  })
}
