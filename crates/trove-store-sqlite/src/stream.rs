//! [`EventStream`] and [`NotificationStore`] implementations.
//!
//! The stream is a plain append-only table whose rowid doubles as the
//! sequence number, plus a per-consumer offset table. Commit offsets only
//! ever move forward.

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use trove_core::event::{
  EventStream, NewNotification, NewStreamEvent, Notification,
  NotificationStore, StreamEvent,
};

use crate::{
  Result,
  encode::{RawNotification, RawStreamEvent, encode_dt, encode_uuid},
  store::SqliteStore,
};

impl EventStream for SqliteStore {
  type Error = crate::Error;

  async fn publish(&self, input: NewStreamEvent) -> Result<StreamEvent> {
    let created_at  = Utc::now();
    let created_str = encode_dt(created_at);
    let payload_str = serde_json::to_string(&input.payload)?;
    let event       = input.event.clone();
    let org_id      = input.org_id.clone();
    let assigned_to = input.assigned_to.clone();

    let seq: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO stream_events (event, org_id, assigned_to, payload, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![event, org_id, assigned_to, payload_str, created_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(StreamEvent {
      seq: seq as u64,
      event: input.event,
      org_id: input.org_id,
      assigned_to: input.assigned_to,
      payload: input.payload,
      created_at,
    })
  }

  async fn fetch_after(&self, after: u64, limit: u32) -> Result<Vec<StreamEvent>> {
    let after = after as i64;
    let limit = limit as i64;

    let raws: Vec<RawStreamEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT seq, event, org_id, assigned_to, payload, created_at
           FROM stream_events
           WHERE seq > ?1
           ORDER BY seq ASC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![after, limit], |row| {
            Ok(RawStreamEvent {
              seq:         row.get(0)?,
              event:       row.get(1)?,
              org_id:      row.get(2)?,
              assigned_to: row.get(3)?,
              payload:     row.get(4)?,
              created_at:  row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStreamEvent::into_event).collect()
  }

  async fn commit(&self, consumer: &str, seq: u64) -> Result<()> {
    let consumer = consumer.to_owned();
    let seq      = seq as i64;

    self
      .conn
      .call(move |conn| {
        // MAX() keeps the cursor monotonic even if a lagging worker
        // commits an old sequence number after a newer one.
        conn.execute(
          "INSERT INTO stream_offsets (consumer, committed_seq)
           VALUES (?1, ?2)
           ON CONFLICT (consumer) DO UPDATE SET
             committed_seq = MAX(committed_seq, excluded.committed_seq)",
          rusqlite::params![consumer, seq],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn committed(&self, consumer: &str) -> Result<u64> {
    let consumer = consumer.to_owned();

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT committed_seq FROM stream_offsets WHERE consumer = ?1",
              rusqlite::params![consumer],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(seq.unwrap_or(0) as u64)
  }
}

impl NotificationStore for SqliteStore {
  type Error = crate::Error;

  async fn append(&self, input: NewNotification) -> Result<Notification> {
    let id_str      = encode_uuid(Uuid::new_v4());
    let seq         = input.seq as i64;
    let payload_str = serde_json::to_string(&input.payload)?;
    let created_str = encode_dt(Utc::now());

    let raw: RawNotification = self
      .conn
      .call(move |conn| {
        // DO NOTHING + re-read: a replayed append returns the stored row.
        conn.execute(
          "INSERT INTO notifications (id, seq, org_id, user_id, event, payload, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (seq) DO NOTHING",
          rusqlite::params![
            id_str,
            seq,
            input.org_id,
            input.user_id,
            input.event,
            payload_str,
            created_str,
          ],
        )?;
        let raw = conn.query_row(
          "SELECT id, seq, org_id, user_id, event, payload, created_at
           FROM notifications WHERE seq = ?1",
          rusqlite::params![seq],
          read_notification_row,
        )?;
        Ok(raw)
      })
      .await?;

    raw.into_notification()
  }

  async fn list_for_user(
    &self,
    org_id: &str,
    user_id: &str,
    limit: u32,
  ) -> Result<Vec<Notification>> {
    let org   = org_id.to_owned();
    let uid   = user_id.to_owned();
    let limit = limit as i64;

    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, seq, org_id, user_id, event, payload, created_at
           FROM notifications
           WHERE org_id = ?1 AND user_id = ?2
           ORDER BY seq DESC
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![org, uid, limit], read_notification_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }
}

fn read_notification_row(
  row: &rusqlite::Row,
) -> rusqlite::Result<RawNotification> {
  Ok(RawNotification {
    id:         row.get(0)?,
    seq:        row.get(1)?,
    org_id:     row.get(2)?,
    user_id:    row.get(3)?,
    event:      row.get(4)?,
    payload:    row.get(5)?,
    created_at: row.get(6)?,
  })
}
