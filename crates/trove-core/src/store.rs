//! The `GraphStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `trove-store-sqlite`).
//! Higher layers (`trove-relations`, `trove-api`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  principal::{KnowledgeBase, NewUser, Permission, RelationshipType, Role, User},
  record::{
    FileRecord, IndexingStatus, NewFileRecord, NewRecord, Origin, Record,
    RecordBundle, RecordType,
  },
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Sort column for [`GraphStore::list_records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
  #[default]
  CreatedAt,
  UpdatedAt,
  RecordName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

/// Parameters for [`GraphStore::list_records`]. Empty vectors mean "no
/// restriction on that attribute". `page` is 1-based.
#[derive(Debug, Clone)]
pub struct RecordQuery {
  /// Case-insensitive substring filter over record names.
  pub search:          Option<String>,
  pub record_types:    Vec<RecordType>,
  pub origins:         Vec<Origin>,
  pub indexing_status: Vec<IndexingStatus>,
  pub date_from:       Option<DateTime<Utc>>,
  pub date_to:         Option<DateTime<Utc>>,
  pub sort_by:         SortBy,
  pub sort_order:      SortOrder,
  pub page:            u32,
  pub limit:           u32,
}

impl Default for RecordQuery {
  fn default() -> Self {
    Self {
      search:          None,
      record_types:    Vec::new(),
      origins:         Vec::new(),
      indexing_status: Vec::new(),
      date_from:       None,
      date_to:         None,
      sort_by:         SortBy::default(),
      sort_order:      SortOrder::default(),
      page:            1,
      limit:           20,
    }
  }
}

/// One page of records plus the total match count, so callers can paginate
/// without a second query.
#[derive(Debug, Clone)]
pub struct RecordPage {
  pub records:     Vec<Record>,
  pub total_count: u64,
  pub page:        u32,
  pub limit:       u32,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the graph storage backend.
///
/// Entity upserts are idempotent at the store level (unique constraints, not
/// advisory locks) so concurrent get-or-create races cannot produce duplicate
/// rows. The record/file-record batch insert is the only multi-row
/// transaction; edge writes are separate single-row operations.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users and knowledge bases ─────────────────────────────────────────

  /// Look up a user by identity-provider key within an org.
  fn find_user<'a>(
    &'a self,
    org_id: &'a str,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Insert a user iff absent and return the stored row either way.
  /// Identity and profile fields of an existing row are never modified.
  fn upsert_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Look up an org's knowledge base.
  fn find_knowledge_base<'a>(
    &'a self,
    org_id: &'a str,
  ) -> impl Future<Output = Result<Option<KnowledgeBase>, Self::Error>> + Send + 'a;

  /// Insert the org's knowledge base iff absent and return the stored row
  /// either way. Safe under concurrent calls for the same org.
  fn upsert_knowledge_base<'a>(
    &'a self,
    org_id: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<KnowledgeBase, Self::Error>> + Send + 'a;

  // ── Permission edges ──────────────────────────────────────────────────

  /// The role carried by the permission edge from `user_key` to `kb_key`,
  /// if one exists.
  fn permission_role(
    &self,
    user_key: Uuid,
    kb_key: Uuid,
  ) -> impl Future<Output = Result<Option<Role>, Self::Error>> + Send + '_;

  /// Create or overwrite the permission edge from `user_key` to `kb_key`.
  /// Granting the same role twice is a no-op.
  fn upsert_permission(
    &self,
    user_key: Uuid,
    kb_key: Uuid,
    relationship_type: RelationshipType,
    role: Role,
  ) -> impl Future<Output = Result<Permission, Self::Error>> + Send + '_;

  // ── Records ───────────────────────────────────────────────────────────

  /// Insert record/file-record pairs in a single transaction. Either every
  /// pair lands or none does; a record can never be observed without its
  /// companion.
  fn insert_records(
    &self,
    pairs: Vec<(NewRecord, NewFileRecord)>,
  ) -> impl Future<Output = Result<Vec<(Record, FileRecord)>, Self::Error>> + Send + '_;

  /// Create the membership edge Record —(belongs-to)→ KnowledgeBase.
  /// Deliberately outside the insert transaction; see the reconciliation
  /// methods below for the failure window.
  fn add_record_to_kb(
    &self,
    record_key: Uuid,
    kb_key: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Create the Record —(is-of-type)→ FileRecord edge.
  fn link_file_record(
    &self,
    record_key: Uuid,
    file_key: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Fetch a record (with its file companion, if any) by key, scoped to an
  /// org. Out-of-org keys read as absent.
  fn get_record<'a>(
    &'a self,
    org_id: &'a str,
    record_key: Uuid,
  ) -> impl Future<Output = Result<Option<RecordBundle>, Self::Error>> + Send + 'a;

  /// List records for an org. Soft-deleted records are always excluded.
  fn list_records<'a>(
    &'a self,
    org_id: &'a str,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<RecordPage, Self::Error>> + Send + 'a;

  /// Write back a record row the caller previously read. Keyed by
  /// `record.id`; rows are never physically deleted, so the target always
  /// exists.
  fn update_record<'a>(
    &'a self,
    record: &'a Record,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Write back a file-record row.
  fn update_file_record<'a>(
    &'a self,
    file: &'a FileRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Reconciliation ────────────────────────────────────────────────────

  /// Records that were inserted but never got their knowledge-base
  /// membership edge (a crash between insert and edge creation). Oldest
  /// first, up to `limit`.
  fn records_without_kb_edge(
    &self,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;
}
