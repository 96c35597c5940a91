//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings; a fixed UTC offset keeps
//! lexicographic and chronological order identical, so date-range filters
//! can compare TEXT columns directly. Enumerations are stored as their
//! uppercase discriminant strings. UUIDs are stored as hyphenated lowercase
//! strings. Opaque payloads are stored as compact JSON.

use chrono::{DateTime, Utc};
use trove_core::{
  event::{Notification, StreamEvent},
  principal::{KnowledgeBase, Permission, RelationshipType, Role, User},
  record::{FileRecord, IndexingStatus, Origin, Record, RecordType},
  transfer::{Transfer, TransferStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<Role> {
  Role::parse(s).ok_or_else(|| Error::Decode(format!("role: {s:?}")))
}

pub fn decode_relationship_type(s: &str) -> Result<RelationshipType> {
  RelationshipType::parse(s)
    .ok_or_else(|| Error::Decode(format!("relationship type: {s:?}")))
}

pub fn decode_record_type(s: &str) -> Result<RecordType> {
  RecordType::parse(s).ok_or_else(|| Error::Decode(format!("record type: {s:?}")))
}

pub fn decode_origin(s: &str) -> Result<Origin> {
  Origin::parse(s).ok_or_else(|| Error::Decode(format!("origin: {s:?}")))
}

pub fn decode_indexing_status(s: &str) -> Result<IndexingStatus> {
  IndexingStatus::parse(s)
    .ok_or_else(|| Error::Decode(format!("indexing status: {s:?}")))
}

pub fn decode_transfer_status(s: &str) -> Result<TransferStatus> {
  TransferStatus::parse(s)
    .ok_or_else(|| Error::Decode(format!("transfer status: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub id:         String,
  pub user_id:    String,
  pub org_id:     String,
  pub email:      String,
  pub full_name:  Option<String>,
  pub created_at: String,
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:         decode_uuid(&self.id)?,
      user_id:    self.user_id,
      org_id:     self.org_id,
      email:      self.email,
      full_name:  self.full_name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `knowledge_bases` row.
pub struct RawKnowledgeBase {
  pub id:         String,
  pub org_id:     String,
  pub name:       String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawKnowledgeBase {
  pub fn into_knowledge_base(self) -> Result<KnowledgeBase> {
    Ok(KnowledgeBase {
      id:         decode_uuid(&self.id)?,
      org_id:     self.org_id,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `permissions` row.
pub struct RawPermission {
  pub user_key:          String,
  pub kb_key:            String,
  pub role:              String,
  pub relationship_type: String,
  pub created_at:        String,
}

impl RawPermission {
  pub fn into_permission(self) -> Result<Permission> {
    Ok(Permission {
      user_key:          decode_uuid(&self.user_key)?,
      kb_key:            decode_uuid(&self.kb_key)?,
      role:              decode_role(&self.role)?,
      relationship_type: decode_relationship_type(&self.relationship_type)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `records` row.
pub struct RawRecord {
  pub id:                 String,
  pub org_id:             String,
  pub record_name:        String,
  pub external_record_id: String,
  pub record_type:        String,
  pub origin:             String,
  pub version:            i64,
  pub indexing_status:    String,
  pub is_deleted:         bool,
  pub is_archived:        bool,
  pub created_at:         String,
  pub updated_at:         String,
  pub deleted_at:         Option<String>,
  pub deleted_by:         Option<String>,
  pub archived_by:        Option<String>,
  pub archived_at:        Option<String>,
}

impl RawRecord {
  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      id:                 decode_uuid(&self.id)?,
      org_id:             self.org_id,
      record_name:        self.record_name,
      external_record_id: self.external_record_id,
      record_type:        decode_record_type(&self.record_type)?,
      origin:             decode_origin(&self.origin)?,
      version:            self.version as u32,
      indexing_status:    decode_indexing_status(&self.indexing_status)?,
      is_deleted:         self.is_deleted,
      is_archived:        self.is_archived,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
      deleted_at:         decode_dt_opt(self.deleted_at.as_deref())?,
      deleted_by:         self.deleted_by,
      archived_by:        self.archived_by,
      archived_at:        decode_dt_opt(self.archived_at.as_deref())?,
    })
  }
}

/// Raw values read directly from a `file_records` row.
pub struct RawFileRecord {
  pub id:                String,
  pub org_id:            String,
  pub file_name:         String,
  pub extension:         Option<String>,
  pub mime_type:         Option<String>,
  pub size_in_bytes:     i64,
  pub web_url:           Option<String>,
  pub is_latest_version: bool,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawFileRecord {
  pub fn into_file_record(self) -> Result<FileRecord> {
    Ok(FileRecord {
      id:                decode_uuid(&self.id)?,
      org_id:            self.org_id,
      file_name:         self.file_name,
      extension:         self.extension,
      mime_type:         self.mime_type,
      size_in_bytes:     self.size_in_bytes as u64,
      web_url:           self.web_url,
      is_latest_version: self.is_latest_version,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `transfers` row.
pub struct RawTransfer {
  pub id:            String,
  pub record_key:    String,
  pub org_id:        String,
  pub user_id:       String,
  pub target_url:    String,
  pub document_id:   String,
  pub document_name: String,
  pub content_type:  String,
  pub body:          Vec<u8>,
  pub attempts:      i64,
  pub max_attempts:  i64,
  pub status:        String,
  pub last_error:    Option<String>,
  pub next_run_at:   String,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawTransfer {
  pub fn into_transfer(self) -> Result<Transfer> {
    Ok(Transfer {
      id:            decode_uuid(&self.id)?,
      record_key:    decode_uuid(&self.record_key)?,
      org_id:        self.org_id,
      user_id:       self.user_id,
      target_url:    self.target_url,
      document_id:   self.document_id,
      document_name: self.document_name,
      content_type:  self.content_type,
      body:          self.body,
      attempts:      self.attempts as u32,
      max_attempts:  self.max_attempts as u32,
      status:        decode_transfer_status(&self.status)?,
      last_error:    self.last_error,
      next_run_at:   decode_dt(&self.next_run_at)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `stream_events` row.
pub struct RawStreamEvent {
  pub seq:         i64,
  pub event:       String,
  pub org_id:      String,
  pub assigned_to: Option<String>,
  pub payload:     String,
  pub created_at:  String,
}

impl RawStreamEvent {
  pub fn into_event(self) -> Result<StreamEvent> {
    Ok(StreamEvent {
      seq:         self.seq as u64,
      event:       self.event,
      org_id:      self.org_id,
      assigned_to: self.assigned_to,
      payload:     serde_json::from_str(&self.payload)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `notifications` row.
pub struct RawNotification {
  pub id:         String,
  pub seq:        i64,
  pub org_id:     String,
  pub user_id:    String,
  pub event:      String,
  pub payload:    String,
  pub created_at: String,
}

impl RawNotification {
  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      id:         decode_uuid(&self.id)?,
      seq:        self.seq as u64,
      org_id:     self.org_id,
      user_id:    self.user_id,
      event:      self.event,
      payload:    serde_json::from_str(&self.payload)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
