//! Handlers for the `/api/v1/knowledgeBase` endpoints.
//!
//! | Method   | Path                      | Notes                                  |
//! |----------|---------------------------|----------------------------------------|
//! | `POST`   | `/`                       | Multipart upload; one record per file  |
//! | `GET`    | `/records`                | Filtered, paginated listing            |
//! | `GET`    | `/records/{id}`           | 404 when absent or cross-org           |
//! | `PUT`    | `/records/{id}`           | `record` JSON patch and/or `file` part |
//! | `DELETE` | `/records/{id}`           | Soft delete                            |
//! | `PATCH`  | `/records/{id}/archive`   |                                        |
//! | `PATCH`  | `/records/{id}/unarchive` |                                        |

use axum::{
  Json,
  extract::{Multipart, Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use trove_core::{
  event::{EventStream, NewStreamEvent, RecordEventData, RecordEventKind},
  patch::RecordPatch,
  principal::{Role, WRITE_ROLES},
  record::{
    FileRecord, IndexingStatus, NewFileRecord, NewRecord, Origin, Record,
    RecordBundle, RecordType,
  },
  store::{GraphStore, RecordQuery, SortBy, SortOrder},
  transfer::TransferStore,
};
use trove_relations::NewFileVersion;
use trove_storage::{FileUpload, StorageUpload};
use uuid::Uuid;

use crate::{
  AppState,
  context::UserContext,
  error::ApiError,
  upload::{self, UploadedFile},
};

const MAX_PAGE_SIZE: u32 = 100;

// ─── Upload ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadReply {
  pub records: Vec<RecordBundle>,
}

/// `POST /` — multipart file upload.
///
/// Hands each file to the storage service, then inserts all record pairs in
/// one transaction. A `strictFileUpload=false` field downgrades the
/// no-files case from an error to an empty success.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  multipart: Multipart,
) -> Result<impl IntoResponse, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let form = upload::collect(multipart).await?;
  if form.files.is_empty() {
    if form.bool_field("strictFileUpload", true) {
      return Err(ApiError::BadRequest("no files attached".into()));
    }
    return Ok((StatusCode::OK, Json(UploadReply { records: Vec::new() })));
  }

  let user = state
    .relations
    .find_or_create_user(
      &ctx.user_id,
      ctx.email.as_deref().unwrap_or_default(),
      &ctx.org_id,
      None,
    )
    .await?;
  let kb = state.relations.get_or_create_knowledge_base(&ctx.org_id).await?;
  let role = state.relations.ensure_permission(kb.id, user.id, Role::Owner).await?;
  if !WRITE_ROLES.contains(&role) {
    return Err(ApiError::Forbidden(format!(
      "role {} cannot upload records",
      role.as_str()
    )));
  }

  // Storage hand-off happens before any graph write, so a failed upload
  // never leaves a record behind.
  let mut pairs = Vec::with_capacity(form.files.len());
  let mut pending = Vec::with_capacity(form.files.len());
  for file in form.files {
    let UploadedFile { file_name, mime_type, bytes } = file;
    let size_in_bytes = bytes.len() as u64;
    let extension = extension_of(&file_name);
    let document_path = format!("{}/{}/{file_name}", ctx.org_id, ctx.user_id);

    let outcome = state
      .storage
      .save_file_to_storage(
        FileUpload {
          file_name:     file_name.clone(),
          mime_type:     mime_type.clone(),
          bytes,
          authorization: ctx.authorization.clone(),
        },
        &document_path,
        true,
      )
      .await?;
    let doc = outcome.document_ref();
    pending.push(match outcome {
      StorageUpload::Redirected(transfer) => Some(transfer),
      StorageUpload::Stored(_) => None,
    });
    pairs.push((
      NewRecord {
        org_id:             ctx.org_id.clone(),
        record_name:        file_name.clone(),
        external_record_id: doc.document_id,
        record_type:        RecordType::File,
        origin:             Origin::Upload,
      },
      NewFileRecord {
        org_id: ctx.org_id.clone(),
        file_name,
        extension,
        mime_type,
        size_in_bytes,
        web_url: None,
      },
    ));
  }

  let inserted = state.relations.create_records_with_files(kb.id, pairs).await?;

  for ((record, file), transfer) in inserted.iter().zip(pending) {
    if let Some(transfer) = transfer {
      state
        .store
        .enqueue(transfer.into_transfer(
          record.id,
          ctx.org_id.clone(),
          ctx.user_id.clone(),
          state.transfer_max_attempts,
        ))
        .await
        .map_err(|e| ApiError::Internal(Box::new(e)))?;
    }
    publish_event(&state, RecordEventKind::NewRecord, record, Some(file), &ctx.user_id)
      .await;
  }

  let records = inserted
    .into_iter()
    .map(|(record, file_record)| RecordBundle {
      record,
      file_record: Some(file_record),
    })
    .collect();
  Ok((StatusCode::CREATED, Json(UploadReply { records })))
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub page:            Option<u32>,
  pub limit:           Option<u32>,
  pub search:          Option<String>,
  /// Comma-separated `RecordType` discriminants.
  pub record_types:    Option<String>,
  pub origins:         Option<String>,
  pub indexing_status: Option<String>,
  /// Epoch milliseconds, inclusive.
  pub date_from:       Option<i64>,
  pub date_to:         Option<i64>,
  pub sort_by:         Option<String>,
  pub sort_order:      Option<String>,
}

impl ListParams {
  fn into_query(self) -> Result<RecordQuery, ApiError> {
    let mut query = RecordQuery::default();
    if let Some(page) = self.page {
      query.page = page.max(1);
    }
    if let Some(limit) = self.limit {
      query.limit = limit.clamp(1, MAX_PAGE_SIZE);
    }
    query.search = self.search;
    query.record_types =
      parse_csv(self.record_types.as_deref(), RecordType::parse, "recordTypes")?;
    query.origins = parse_csv(self.origins.as_deref(), Origin::parse, "origins")?;
    query.indexing_status = parse_csv(
      self.indexing_status.as_deref(),
      IndexingStatus::parse,
      "indexingStatus",
    )?;
    query.date_from = parse_ms(self.date_from, "dateFrom")?;
    query.date_to = parse_ms(self.date_to, "dateTo")?;
    if let Some(raw) = self.sort_by.as_deref() {
      query.sort_by = match raw {
        "createdAtTimestamp" => SortBy::CreatedAt,
        "updatedAtTimestamp" => SortBy::UpdatedAt,
        "recordName" => SortBy::RecordName,
        other => {
          return Err(ApiError::BadRequest(format!(
            "unknown sortBy value `{other}`"
          )));
        }
      };
    }
    if let Some(raw) = self.sort_order.as_deref() {
      query.sort_order = match raw {
        "asc" => SortOrder::Asc,
        "desc" => SortOrder::Desc,
        other => {
          return Err(ApiError::BadRequest(format!(
            "unknown sortOrder value `{other}`"
          )));
        }
      };
    }
    Ok(query)
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page:        u32,
  pub limit:       u32,
  pub total_count: u64,
  pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListReply {
  pub records:    Vec<Record>,
  pub pagination: Pagination,
}

/// `GET /records` — filtered, paginated listing.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Query(params): Query<ListParams>,
) -> Result<Json<ListReply>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let query = params.into_query()?;
  let page =
    state.relations.get_records(&ctx.user_id, &ctx.org_id, &query).await?;
  Ok(Json(ListReply {
    pagination: Pagination {
      page:        page.page,
      limit:       page.limit,
      total_count: page.total_count,
      total_pages: page.total_count.div_ceil(u64::from(page.limit.max(1))),
    },
    records:    page.records,
  }))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /records/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Path(id): Path<Uuid>,
) -> Result<Json<RecordBundle>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let bundle =
    state.relations.get_record_by_id(id, &ctx.user_id, &ctx.org_id).await?;
  Ok(Json(bundle))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /records/{id}` — multipart.
///
/// An optional `record` text field carries a JSON patch; an optional file
/// part replaces the stored file as a new version. Either alone is valid.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Path(id): Path<Uuid>,
  multipart: Multipart,
) -> Result<Json<RecordBundle>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let form = upload::collect(multipart).await?;
  if form.files.len() > 1 {
    return Err(ApiError::BadRequest(
      "at most one replacement file per update".into(),
    ));
  }
  let patch = match form.fields.get("record") {
    Some(raw) => {
      let value: Value = serde_json::from_str(raw).map_err(|e| {
        ApiError::BadRequest(format!("malformed `record` field: {e}"))
      })?;
      RecordPatch::from_value(value)?
    }
    None => RecordPatch::default(),
  };

  state.relations.update_record(id, &ctx.user_id, &ctx.org_id, patch).await?;

  if let Some(file) = form.files.into_iter().next() {
    replace_file(&state, &ctx, id, file).await?;
  }

  let bundle =
    state.relations.get_record_by_id(id, &ctx.user_id, &ctx.org_id).await?;
  publish_event(
    &state,
    RecordEventKind::UpdateRecord,
    &bundle.record,
    bundle.file_record.as_ref(),
    &ctx.user_id,
  )
  .await;
  Ok(Json(bundle))
}

/// Push the replacement bytes to storage, then record the new version.
async fn replace_file<S>(
  state: &AppState<S>,
  ctx: &UserContext,
  id: Uuid,
  file: UploadedFile,
) -> Result<(), ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let current =
    state.relations.get_record_by_id(id, &ctx.user_id, &ctx.org_id).await?;
  let UploadedFile { file_name, mime_type, bytes } = file;
  let size_in_bytes = bytes.len() as u64;
  let extension = extension_of(&file_name);

  state
    .storage
    .upload_next_version(&current.record.external_record_id, FileUpload {
      file_name:     file_name.clone(),
      mime_type:     mime_type.clone(),
      bytes,
      authorization: ctx.authorization.clone(),
    })
    .await?;
  state
    .relations
    .replace_file_version(id, &ctx.user_id, &ctx.org_id, NewFileVersion {
      file_name: Some(file_name),
      extension,
      mime_type,
      size_in_bytes,
    })
    .await?;
  Ok(())
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /records/{id}` — soft delete; the row survives for audit.
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Path(id): Path<Uuid>,
) -> Result<Json<Record>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let record =
    state.relations.soft_delete_record(id, &ctx.user_id, &ctx.org_id).await?;
  publish_event(&state, RecordEventKind::DeleteRecord, &record, None, &ctx.user_id)
    .await;
  Ok(Json(record))
}

// ─── Archive ─────────────────────────────────────────────────────────────────

/// `PATCH /records/{id}/archive`
pub async fn archive<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Path(id): Path<Uuid>,
) -> Result<Json<Record>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let record =
    state.relations.archive_record(id, &ctx.user_id, &ctx.org_id).await?;
  publish_event(&state, RecordEventKind::UpdateRecord, &record, None, &ctx.user_id)
    .await;
  Ok(Json(record))
}

/// `PATCH /records/{id}/unarchive`
pub async fn unarchive<S>(
  State(state): State<AppState<S>>,
  ctx: UserContext,
  Path(id): Path<Uuid>,
) -> Result<Json<Record>, ApiError>
where
  S: GraphStore + EventStream + TransferStore + Clone + Send + Sync + 'static,
{
  let record =
    state.relations.unarchive_record(id, &ctx.user_id, &ctx.org_id).await?;
  publish_event(&state, RecordEventKind::UpdateRecord, &record, None, &ctx.user_id)
    .await;
  Ok(Json(record))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Announce a record mutation on the event stream. Publish failures are
/// logged and swallowed; the graph write has already committed.
async fn publish_event<S>(
  state: &AppState<S>,
  kind: RecordEventKind,
  record: &Record,
  file: Option<&FileRecord>,
  assigned_to: &str,
) where
  S: EventStream,
{
  let data = RecordEventData {
    org_id:      record.org_id.clone(),
    record_id:   record.id,
    record_name: record.record_name.clone(),
    record_type: record.record_type,
    origin:      record.origin,
    version:     record.version,
    extension:   file.and_then(|f| f.extension.clone()),
    mime_type:   file.and_then(|f| f.mime_type.clone()),
  };
  let payload = match serde_json::to_value(&data) {
    Ok(payload) => payload,
    Err(err) => {
      warn!(error = %err, "failed to serialise record event payload");
      return;
    }
  };
  if let Err(err) = state
    .store
    .publish(NewStreamEvent {
      event: kind.as_str().to_owned(),
      org_id: record.org_id.clone(),
      assigned_to: Some(assigned_to.to_owned()),
      payload,
    })
    .await
  {
    warn!(error = %err, event = kind.as_str(), "failed to publish record event");
  }
}

fn parse_csv<T>(
  raw: Option<&str>,
  parse: impl Fn(&str) -> Option<T>,
  param: &str,
) -> Result<Vec<T>, ApiError> {
  let Some(raw) = raw else {
    return Ok(Vec::new());
  };
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      parse(s).ok_or_else(|| {
        ApiError::BadRequest(format!("unknown {param} value `{s}`"))
      })
    })
    .collect()
}

fn parse_ms(
  raw: Option<i64>,
  param: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
  raw
    .map(|ms| {
      Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        ApiError::BadRequest(format!("{param} is out of range"))
      })
    })
    .transpose()
}

fn extension_of(file_name: &str) -> Option<String> {
  file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .filter(|ext| !ext.is_empty())
}
