//! [`RelationService`] — graph semantics over a [`GraphStore`] backend.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use trove_core::{
  Error, Result,
  patch::RecordPatch,
  principal::{
    ANY_ROLE, DEFAULT_KB_NAME, KnowledgeBase, NewUser, Permission,
    RelationshipType, Role, User, WRITE_ROLES,
  },
  record::{
    FileRecord, NewFileRecord, NewRecord, Record, RecordBundle, RecordType,
  },
  store::{GraphStore, RecordPage, RecordQuery},
};

/// Metadata for a replacement file version. Fields left `None` keep the
/// current value.
#[derive(Debug, Clone)]
pub struct NewFileVersion {
  pub file_name:     Option<String>,
  pub extension:     Option<String>,
  pub mime_type:     Option<String>,
  pub size_in_bytes: u64,
}

/// The domain layer for users, knowledge bases, records, and their edges.
///
/// Permission and not-found checks always run before any mutating store
/// call; a request that fails either one leaves the graph untouched.
#[derive(Clone)]
pub struct RelationService<S> {
  store: Arc<S>,
}

impl<S: GraphStore> RelationService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  // ── Users and knowledge bases ─────────────────────────────────────────────

  /// Insert the user iff absent and return the stored row either way.
  /// Identity fields of an existing user are never mutated.
  pub async fn find_or_create_user(
    &self,
    user_id: &str,
    email: &str,
    org_id: &str,
    full_name: Option<String>,
  ) -> Result<User> {
    self
      .store
      .upsert_user(NewUser {
        user_id: user_id.to_owned(),
        org_id: org_id.to_owned(),
        email: email.to_owned(),
        full_name,
      })
      .await
      .map_err(Error::store)
  }

  /// Get or lazily create the org's knowledge base. Idempotent per org.
  pub async fn get_or_create_knowledge_base(
    &self,
    org_id: &str,
  ) -> Result<KnowledgeBase> {
    self
      .store
      .upsert_knowledge_base(org_id, DEFAULT_KB_NAME)
      .await
      .map_err(Error::store)
  }

  /// Create or refresh the permission edge from a user to a knowledge base.
  /// Granting the same role twice is a no-op.
  pub async fn create_kb_user_permission(
    &self,
    kb_key: Uuid,
    user_key: Uuid,
    relationship_type: RelationshipType,
    role: Role,
  ) -> Result<Permission> {
    self
      .store
      .upsert_permission(user_key, kb_key, relationship_type, role)
      .await
      .map_err(Error::store)
  }

  /// Grant `role` iff the user holds no permission on the knowledge base
  /// yet. An existing grant, whatever its role, is returned untouched.
  pub async fn ensure_permission(
    &self,
    kb_key: Uuid,
    user_key: Uuid,
    role: Role,
  ) -> Result<Role> {
    if let Some(existing) = self
      .store
      .permission_role(user_key, kb_key)
      .await
      .map_err(Error::store)?
    {
      return Ok(existing);
    }
    self
      .create_kb_user_permission(kb_key, user_key, RelationshipType::User, role)
      .await?;
    Ok(role)
  }

  /// Resolve the caller and check that their permission edge to the org's
  /// knowledge base carries one of `allowed_roles`.
  pub async fn validate_user_kb_access(
    &self,
    user_id: &str,
    org_id: &str,
    allowed_roles: &[Role],
  ) -> Result<(User, KnowledgeBase, Role)> {
    let user = self
      .store
      .find_user(org_id, user_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::PermissionDenied(format!("unknown user: {user_id}"))
      })?;

    let kb = self
      .store
      .find_knowledge_base(org_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::KnowledgeBaseNotFound(org_id.to_owned()))?;

    let role = self
      .store
      .permission_role(user.id, kb.id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        Error::PermissionDenied(format!(
          "user {user_id} has no permission edge to the knowledge base"
        ))
      })?;

    if !allowed_roles.contains(&role) {
      return Err(Error::PermissionDenied(format!(
        "role {} does not qualify for this operation",
        role.as_str()
      )));
    }

    Ok((user, kb, role))
  }

  // ── Record creation ───────────────────────────────────────────────────────

  /// Insert record/file-record pairs transactionally, then link each record
  /// to its file and to the knowledge base.
  ///
  /// Edge creation is deliberately outside the insert transaction: a failure
  /// there is logged and the insert stands. [`Self::reconcile_kb_edges`]
  /// repairs the resulting orphans.
  pub async fn create_records_with_files(
    &self,
    kb_key: Uuid,
    pairs: Vec<(NewRecord, NewFileRecord)>,
  ) -> Result<Vec<(Record, FileRecord)>> {
    let inserted = self
      .store
      .insert_records(pairs)
      .await
      .map_err(Error::store)?;

    for (record, file) in &inserted {
      if let Err(err) = self.store.link_file_record(record.id, file.id).await {
        warn!(record = %record.id, error = %err, "file edge creation failed");
      }
      if let Err(err) = self.store.add_record_to_kb(record.id, kb_key).await {
        warn!(record = %record.id, error = %err, "kb edge creation failed");
      }
    }

    Ok(inserted)
  }

  /// Link a record to its knowledge base. Idempotent.
  pub async fn add_record_to_knowledge_base(
    &self,
    record_key: Uuid,
    kb_key: Uuid,
  ) -> Result<()> {
    self
      .store
      .add_record_to_kb(record_key, kb_key)
      .await
      .map_err(Error::store)
  }

  /// Link a record to its file-record companion. Idempotent.
  pub async fn create_record_file_relationship(
    &self,
    record_key: Uuid,
    file_key: Uuid,
  ) -> Result<()> {
    self
      .store
      .link_file_record(record_key, file_key)
      .await
      .map_err(Error::store)
  }

  // ── Record reads ──────────────────────────────────────────────────────────

  /// Fetch a record by key. Fails with not-found if the record is absent or
  /// belongs to another org, and with a permission error if the caller holds
  /// no edge to the owning knowledge base. Soft-deleted records are still
  /// returned.
  pub async fn get_record_by_id(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
  ) -> Result<RecordBundle> {
    let bundle = self
      .store
      .get_record(org_id, record_key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(record_key))?;

    self.validate_user_kb_access(user_id, org_id, ANY_ROLE).await?;

    Ok(bundle)
  }

  /// Paginated, filtered listing of the org's visible records. Any role
  /// qualifies; soft-deleted records are excluded by the store.
  pub async fn get_records(
    &self,
    user_id: &str,
    org_id: &str,
    query: &RecordQuery,
  ) -> Result<RecordPage> {
    self.validate_user_kb_access(user_id, org_id, ANY_ROLE).await?;

    self
      .store
      .list_records(org_id, query)
      .await
      .map_err(Error::store)
  }

  // ── Record mutation ───────────────────────────────────────────────────────

  /// Apply a validated patch to a record. Stamps `updatedAtTimestamp`; an
  /// `isDeleted: true` transition additionally stamps the deletion fields
  /// and clears `isLatestVersion` on the file companion.
  pub async fn update_record(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
    patch: RecordPatch,
  ) -> Result<Record> {
    let bundle = self
      .store
      .get_record(org_id, record_key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(record_key))?;

    self
      .validate_user_kb_access(user_id, org_id, WRITE_ROLES)
      .await?;

    let mut record = bundle.record;
    let now = Utc::now();

    if let Some(name) = patch.record_name {
      record.record_name = name;
    }
    if let Some(status) = patch.indexing_status {
      record.indexing_status = status;
    }
    match patch.is_deleted {
      Some(true) if !record.is_deleted => {
        record.is_deleted = true;
        record.deleted_at = Some(now);
        record.deleted_by = Some(user_id.to_owned());

        if record.record_type == RecordType::File
          && let Some(mut file) = bundle.file_record
        {
          file.is_latest_version = false;
          file.updated_at = now;
          self
            .store
            .update_file_record(&file)
            .await
            .map_err(Error::store)?;
        }
      }
      Some(false) => {
        // Visibility is restored; the deletion stamps stay for audit.
        record.is_deleted = false;
      }
      _ => {}
    }
    record.updated_at = now;

    self
      .store
      .update_record(&record)
      .await
      .map_err(Error::store)?;
    Ok(record)
  }

  /// Soft-delete a record: visibility-only removal with deletion stamps.
  pub async fn soft_delete_record(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
  ) -> Result<Record> {
    let patch = RecordPatch { is_deleted: Some(true), ..Default::default() };
    self.update_record(record_key, user_id, org_id, patch).await
  }

  /// Archive a record. A no-op if it is already archived; otherwise stamps
  /// `archivedBy`/`archivedAtTimestamp`.
  pub async fn archive_record(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
  ) -> Result<Record> {
    let bundle = self
      .store
      .get_record(org_id, record_key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(record_key))?;

    self
      .validate_user_kb_access(user_id, org_id, WRITE_ROLES)
      .await?;

    let mut record = bundle.record;
    if record.is_archived {
      return Ok(record);
    }

    let now = Utc::now();
    record.is_archived = true;
    record.archived_by = Some(user_id.to_owned());
    record.archived_at = Some(now);
    record.updated_at = now;

    self
      .store
      .update_record(&record)
      .await
      .map_err(Error::store)?;
    Ok(record)
  }

  /// Clear the archived flag. The archival stamps survive so the last
  /// archival stays attributable.
  pub async fn unarchive_record(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
  ) -> Result<Record> {
    let bundle = self
      .store
      .get_record(org_id, record_key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(record_key))?;

    self
      .validate_user_kb_access(user_id, org_id, WRITE_ROLES)
      .await?;

    let mut record = bundle.record;
    if !record.is_archived {
      return Ok(record);
    }

    record.is_archived = false;
    record.updated_at = Utc::now();

    self
      .store
      .update_record(&record)
      .await
      .map_err(Error::store)?;
    Ok(record)
  }

  /// Register a replacement file version: bumps the record's version
  /// counter and refreshes the file metadata.
  pub async fn replace_file_version(
    &self,
    record_key: Uuid,
    user_id: &str,
    org_id: &str,
    version: NewFileVersion,
  ) -> Result<(Record, FileRecord)> {
    let bundle = self
      .store
      .get_record(org_id, record_key)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound(record_key))?;

    self
      .validate_user_kb_access(user_id, org_id, WRITE_ROLES)
      .await?;

    let mut record = bundle.record;
    let Some(mut file) = bundle.file_record else {
      return Err(Error::Validation(
        "record has no file companion to version".into(),
      ));
    };

    let now = Utc::now();
    record.version += 1;
    record.updated_at = now;

    if let Some(name) = version.file_name {
      record.record_name = name.clone();
      file.file_name = name;
    }
    if version.extension.is_some() {
      file.extension = version.extension;
    }
    if version.mime_type.is_some() {
      file.mime_type = version.mime_type;
    }
    file.size_in_bytes = version.size_in_bytes;
    file.is_latest_version = true;
    file.updated_at = now;

    self
      .store
      .update_record(&record)
      .await
      .map_err(Error::store)?;
    self
      .store
      .update_file_record(&file)
      .await
      .map_err(Error::store)?;

    Ok((record, file))
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  /// Repair records that were inserted but never linked to their knowledge
  /// base. Returns how many edges were created.
  pub async fn reconcile_kb_edges(&self, limit: u32) -> Result<u64> {
    let orphans = self
      .store
      .records_without_kb_edge(limit)
      .await
      .map_err(Error::store)?;

    let mut repaired = 0;
    for record in orphans {
      let kb = self.get_or_create_knowledge_base(&record.org_id).await?;
      self.add_record_to_knowledge_base(record.id, kb.id).await?;
      repaired += 1;
    }

    if repaired > 0 {
      warn!(repaired, "relinked records that were missing their kb edge");
    }
    Ok(repaired)
  }
}
