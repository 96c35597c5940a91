//! Service-level tests against an in-memory SQLite store.

use std::sync::Arc;

use serde_json::json;
use trove_core::{
  Error,
  patch::{IMMUTABLE_FIELDS, RecordPatch},
  principal::{KnowledgeBase, RelationshipType, Role, User},
  record::{NewFileRecord, NewRecord, Origin, RecordType},
  store::{GraphStore, RecordQuery},
};
use trove_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{NewFileVersion, RelationService};

async fn service() -> (RelationService<SqliteStore>, Arc<SqliteStore>) {
  let store = Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  );
  (RelationService::new(store.clone()), store)
}

async fn seed_org(
  svc: &RelationService<SqliteStore>,
  org: &str,
  user_id: &str,
  role: Role,
) -> (User, KnowledgeBase) {
  let user = svc
    .find_or_create_user(user_id, &format!("{user_id}@example.com"), org, None)
    .await
    .unwrap();
  let kb = svc.get_or_create_knowledge_base(org).await.unwrap();
  svc
    .create_kb_user_permission(kb.id, user.id, RelationshipType::User, role)
    .await
    .unwrap();
  (user, kb)
}

fn pair(org: &str, name: &str) -> (NewRecord, NewFileRecord) {
  (
    NewRecord {
      org_id:             org.into(),
      record_name:        name.into(),
      external_record_id: format!("doc-{name}"),
      record_type:        RecordType::File,
      origin:             Origin::Upload,
    },
    NewFileRecord {
      org_id:        org.into(),
      file_name:     name.into(),
      extension:     Some("pdf".into()),
      mime_type:     Some("application/pdf".into()),
      size_in_bytes: 2048,
      web_url:       None,
    },
  )
}

// ─── Users, knowledge bases, permissions ─────────────────────────────────────

#[tokio::test]
async fn find_or_create_user_is_idempotent() {
  let (svc, _) = service().await;

  let first = svc
    .find_or_create_user("u-1", "u-1@example.com", "org-1", None)
    .await
    .unwrap();
  let second = svc
    .find_or_create_user("u-1", "changed@example.com", "org-1", Some("A".into()))
    .await
    .unwrap();

  assert_eq!(second.id, first.id);
  assert_eq!(second.email, "u-1@example.com");
}

#[tokio::test]
async fn get_or_create_knowledge_base_is_idempotent() {
  let (svc, _) = service().await;

  let first = svc.get_or_create_knowledge_base("org-1").await.unwrap();
  let second = svc.get_or_create_knowledge_base("org-1").await.unwrap();

  assert_eq!(second.id, first.id);
  assert_eq!(first.name, "Default");
}

#[tokio::test]
async fn validate_access_rejects_unknown_user() {
  let (svc, _) = service().await;
  seed_org(&svc, "org-1", "u-1", Role::Owner).await;

  let err = svc
    .validate_user_kb_access("ghost", "org-1", &[Role::Owner])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
}

#[tokio::test]
async fn validate_access_requires_knowledge_base() {
  let (svc, _) = service().await;
  svc
    .find_or_create_user("u-1", "u-1@example.com", "org-1", None)
    .await
    .unwrap();

  let err = svc
    .validate_user_kb_access("u-1", "org-1", &[Role::Owner])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::KnowledgeBaseNotFound(_)));
}

#[tokio::test]
async fn validate_access_checks_role_allow_set() {
  let (svc, _) = service().await;
  seed_org(&svc, "org-1", "u-1", Role::Reader).await;

  assert!(
    svc
      .validate_user_kb_access("u-1", "org-1", &[Role::Reader, Role::Owner])
      .await
      .is_ok()
  );
  let err = svc
    .validate_user_kb_access("u-1", "org-1", &[Role::Owner])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
}

#[tokio::test]
async fn ensure_permission_never_changes_an_existing_grant() {
  let (svc, _) = service().await;
  let (reader, kb) = seed_org(&svc, "org-1", "u-1", Role::Reader).await;

  let kept = svc
    .ensure_permission(kb.id, reader.id, Role::Owner)
    .await
    .unwrap();
  assert_eq!(kept, Role::Reader);

  let fresh = svc
    .find_or_create_user("u-2", "u-2@example.com", "org-1", None)
    .await
    .unwrap();
  let granted = svc
    .ensure_permission(kb.id, fresh.id, Role::Owner)
    .await
    .unwrap();
  assert_eq!(granted, Role::Owner);
  let (_, _, role) = svc
    .validate_user_kb_access("u-2", "org-1", &[Role::Owner])
    .await
    .unwrap();
  assert_eq!(role, Role::Owner);
}

// ─── Record creation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_records_links_files_and_kb() {
  let (svc, store) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;

  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf"), pair("org-1", "b.pdf")])
    .await
    .unwrap();

  assert_eq!(inserted.len(), 2);
  assert!(inserted.iter().all(|(r, _)| r.version == 1));

  // Every record got both edges.
  assert!(store.records_without_kb_edge(10).await.unwrap().is_empty());
  let bundle = svc
    .get_record_by_id(inserted[0].0.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert!(bundle.file_record.is_some());
}

#[tokio::test]
async fn get_record_by_id_not_found_cases() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;

  let err = svc
    .get_record_by_id(Uuid::new_v4(), &user.user_id, "org-1")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RecordNotFound(_)));

  // A record in another org reads as absent, not as forbidden.
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  seed_org(&svc, "org-2", "u-2", Role::Owner).await;
  let err = svc
    .get_record_by_id(inserted[0].0.id, "u-2", "org-2")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RecordNotFound(_)));
}

// ─── Immutable-field protection ──────────────────────────────────────────────

#[tokio::test]
async fn patch_touching_immutable_fields_is_rejected() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  for field in IMMUTABLE_FIELDS {
    let err =
      RecordPatch::from_value(json!({ (*field): "tampered" })).unwrap_err();
    assert!(
      matches!(err, Error::ImmutableField(ref f) if f == field),
      "expected immutable-field rejection for {field}"
    );
  }

  // Nothing reached the store: the record is byte-for-byte unchanged.
  let stored = svc
    .get_record_by_id(record.id, &user.user_id, "org-1")
    .await
    .unwrap()
    .record;
  assert_eq!(stored.updated_at, record.updated_at);
  assert_eq!(stored.record_name, record.record_name);
}

#[tokio::test]
async fn patch_with_unknown_field_is_rejected() {
  let err = RecordPatch::from_value(json!({ "sizeInBytes": 99 })).unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = RecordPatch::from_value(json!(["not", "an", "object"])).unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

// ─── Update and soft-delete ──────────────────────────────────────────────────

#[tokio::test]
async fn update_applies_patch_and_stamps_updated_at() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  let patch =
    RecordPatch::from_value(json!({ "recordName": "renamed.pdf" })).unwrap();
  let updated = svc
    .update_record(record.id, &user.user_id, "org-1", patch)
    .await
    .unwrap();

  assert_eq!(updated.record_name, "renamed.pdf");
  assert!(updated.updated_at > record.updated_at);
  assert_eq!(updated.version, 1);
}

#[tokio::test]
async fn soft_delete_stamps_and_hides_from_listing() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  let deleted = svc
    .soft_delete_record(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert!(deleted.is_deleted);
  assert_eq!(deleted.deleted_by.as_deref(), Some("u-1"));
  assert!(deleted.deleted_at.is_some());

  // Excluded from the default listing.
  let page = svc
    .get_records(&user.user_id, "org-1", &RecordQuery::default())
    .await
    .unwrap();
  assert_eq!(page.total_count, 0);

  // Still retrievable by id, flagged deleted, file no longer latest.
  let bundle = svc
    .get_record_by_id(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert!(bundle.record.is_deleted);
  assert!(!bundle.file_record.unwrap().is_latest_version);
}

// ─── Archive ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_unarchive_round_trip_preserves_stamps() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  let archived = svc
    .archive_record(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert!(archived.is_archived);
  assert_eq!(archived.archived_by.as_deref(), Some("u-1"));
  let stamp = archived.archived_at.unwrap();

  let restored = svc
    .unarchive_record(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert!(!restored.is_archived);
  assert_eq!(restored.archived_by.as_deref(), Some("u-1"));
  assert_eq!(restored.archived_at, Some(stamp));
}

#[tokio::test]
async fn archive_twice_is_a_no_op() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  let first = svc
    .archive_record(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  let second = svc
    .archive_record(record.id, &user.user_id, "org-1")
    .await
    .unwrap();
  assert_eq!(second.archived_at, first.archived_at);
  assert_eq!(second.updated_at, first.updated_at);
}

// ─── Permission gate ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reader_can_read_but_not_mutate() {
  let (svc, _) = service().await;
  let (_owner, kb) = seed_org(&svc, "org-1", "owner", Role::Owner).await;
  let (reader, _) = seed_org(&svc, "org-1", "reader", Role::Reader).await;

  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  // Reads succeed.
  svc
    .get_record_by_id(record.id, &reader.user_id, "org-1")
    .await
    .unwrap();
  svc
    .get_records(&reader.user_id, "org-1", &RecordQuery::default())
    .await
    .unwrap();

  // Mutations are refused.
  let patch =
    RecordPatch::from_value(json!({ "recordName": "nope.pdf" })).unwrap();
  let err = svc
    .update_record(record.id, &reader.user_id, "org-1", patch)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));

  let err = svc
    .soft_delete_record(record.id, &reader.user_id, "org-1")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));

  let err = svc
    .archive_record(record.id, &reader.user_id, "org-1")
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PermissionDenied(_)));
}

// ─── File versions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_file_version_increments_version() {
  let (svc, _) = service().await;
  let (user, kb) = seed_org(&svc, "org-1", "u-1", Role::Owner).await;
  let inserted = svc
    .create_records_with_files(kb.id, vec![pair("org-1", "a.pdf")])
    .await
    .unwrap();
  let record = &inserted[0].0;

  let (updated, file) = svc
    .replace_file_version(
      record.id,
      &user.user_id,
      "org-1",
      NewFileVersion {
        file_name:     Some("a-v2.pdf".into()),
        extension:     None,
        mime_type:     None,
        size_in_bytes: 4096,
      },
    )
    .await
    .unwrap();

  assert_eq!(updated.version, 2);
  assert_eq!(updated.record_name, "a-v2.pdf");
  assert_eq!(file.size_in_bytes, 4096);
  assert!(file.is_latest_version);
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_relinks_orphaned_records() {
  let (svc, store) = service().await;
  seed_org(&svc, "org-1", "u-1", Role::Owner).await;

  // Insert behind the service's back, skipping edge creation.
  store
    .insert_records(vec![pair("org-1", "orphan.pdf")])
    .await
    .unwrap();
  assert_eq!(store.records_without_kb_edge(10).await.unwrap().len(), 1);

  let repaired = svc.reconcile_kb_edges(10).await.unwrap();
  assert_eq!(repaired, 1);
  assert!(store.records_without_kb_edge(10).await.unwrap().is_empty());

  // Nothing left to repair on the next sweep.
  assert_eq!(svc.reconcile_kb_edges(10).await.unwrap(), 0);
}
