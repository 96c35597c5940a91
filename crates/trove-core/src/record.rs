//! Record and file-record types — the document entities of the knowledge base.
//!
//! A record is the logical document tracked by the knowledge base, independent
//! of where its bytes live. Every FILE record has a 1:1 file-record companion
//! holding the file-specific metadata; the pair is inserted in one transaction
//! so neither can exist without the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Closed enumerations ─────────────────────────────────────────────────────

/// What kind of document a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
  File,
  Webpage,
  Message,
  Mail,
  Others,
}

impl RecordType {
  /// The discriminant string stored in the `record_type` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::File => "FILE",
      Self::Webpage => "WEBPAGE",
      Self::Message => "MESSAGE",
      Self::Mail => "MAIL",
      Self::Others => "OTHERS",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "FILE" => Some(Self::File),
      "WEBPAGE" => Some(Self::Webpage),
      "MESSAGE" => Some(Self::Message),
      "MAIL" => Some(Self::Mail),
      "OTHERS" => Some(Self::Others),
      _ => None,
    }
  }
}

/// How a record entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
  Upload,
  Connector,
}

impl Origin {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Upload => "UPLOAD",
      Self::Connector => "CONNECTOR",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "UPLOAD" => Some(Self::Upload),
      "CONNECTOR" => Some(Self::Connector),
      _ => None,
    }
  }
}

/// Progress of the downstream indexing pipeline for a record. This service
/// only ever sets `NotStarted` at creation; later transitions arrive as
/// patches from the indexing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexingStatus {
  NotStarted,
  InProgress,
  Completed,
  Failed,
}

impl IndexingStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotStarted => "NOT_STARTED",
      Self::InProgress => "IN_PROGRESS",
      Self::Completed => "COMPLETED",
      Self::Failed => "FAILED",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "NOT_STARTED" => Some(Self::NotStarted),
      "IN_PROGRESS" => Some(Self::InProgress),
      "COMPLETED" => Some(Self::Completed),
      "FAILED" => Some(Self::Failed),
      _ => None,
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A logical document tracked by the knowledge base.
///
/// `external_record_id`, `record_type`, `origin`, `org_id`, and `created_at`
/// are immutable after creation. Soft-delete and archive are orthogonal
/// flags; neither ever removes the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  pub id:                 Uuid,
  pub org_id:             String,
  pub record_name:        String,
  /// Storage-service document id. Provisional until an async transfer for
  /// the record completes, but never rewritten by this service either way.
  pub external_record_id: String,
  pub record_type:        RecordType,
  pub origin:             Origin,
  /// Starts at 1; incremented only by file-version replacement.
  pub version:            u32,
  pub indexing_status:    IndexingStatus,
  pub is_deleted:         bool,
  pub is_archived:        bool,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at:         DateTime<Utc>,
  #[serde(
    rename = "updatedAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub updated_at:         DateTime<Utc>,
  #[serde(
    rename = "deletedAtTimestamp",
    with = "chrono::serde::ts_milliseconds_option",
    skip_serializing_if = "Option::is_none",
    default
  )]
  pub deleted_at:         Option<DateTime<Utc>>,
  /// Identity-provider id of the user who soft-deleted the record.
  #[serde(
    rename = "deletedByUserId",
    skip_serializing_if = "Option::is_none",
    default
  )]
  pub deleted_by:         Option<String>,
  /// Identity-provider id of the user who archived the record. Survives
  /// unarchive so the last archival is still attributable.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub archived_by:        Option<String>,
  #[serde(
    rename = "archivedAtTimestamp",
    with = "chrono::serde::ts_milliseconds_option",
    skip_serializing_if = "Option::is_none",
    default
  )]
  pub archived_at:        Option<DateTime<Utc>>,
}

/// Input to the transactional record insert. Server-assigned fields (graph
/// key, version, flags, timestamps) are filled in by the store.
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub org_id:             String,
  pub record_name:        String,
  pub external_record_id: String,
  pub record_type:        RecordType,
  pub origin:             Origin,
}

// ─── FileRecord ──────────────────────────────────────────────────────────────

/// File-specific metadata companion to a FILE record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
  pub id:                Uuid,
  pub org_id:            String,
  pub file_name:         String,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub extension:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub mime_type:         Option<String>,
  pub size_in_bytes:     u64,
  /// Storage-service URL the file can be fetched from, when known.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub web_url:           Option<String>,
  /// Cleared when the owning record is soft-deleted or a newer version of
  /// the file is uploaded.
  pub is_latest_version: bool,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at:        DateTime<Utc>,
  #[serde(
    rename = "updatedAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub updated_at:        DateTime<Utc>,
}

/// Input to the transactional file-record insert; paired 1:1 with a
/// [`NewRecord`] in the same batch position.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
  pub org_id:        String,
  pub file_name:     String,
  pub extension:     Option<String>,
  pub mime_type:     Option<String>,
  pub size_in_bytes: u64,
  pub web_url:       Option<String>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A record joined with its file-record companion, as returned by the
/// get-by-id path. Non-FILE records have no companion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBundle {
  #[serde(flatten)]
  pub record:      Record,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub file_record: Option<FileRecord>,
}
