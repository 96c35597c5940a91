//! [`SqliteStore`] — the SQLite implementation of [`GraphStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use trove_core::{
  principal::{KnowledgeBase, NewUser, Permission, RelationshipType, Role, User},
  record::{
    FileRecord, IndexingStatus, NewFileRecord, NewRecord, Record, RecordBundle,
  },
  store::{GraphStore, RecordPage, RecordQuery, SortBy, SortOrder},
};

use crate::{
  Error, Result,
  encode::{
    RawFileRecord, RawKnowledgeBase, RawPermission, RawRecord, RawUser,
    decode_role, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// Column list shared by every `records` SELECT so the row reader can stay
/// positional.
pub(crate) const RECORD_COLS: &str = "id, org_id, record_name, \
   external_record_id, record_type, origin, version, indexing_status, \
   is_deleted, is_archived, created_at, updated_at, deleted_at, deleted_by, \
   archived_by, archived_at";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Trove store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. The same
/// value implements the graph store, the transfer queue, the event stream,
/// and the notification log; all of them share one database.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  // ── Users and knowledge bases ─────────────────────────────────────────────

  async fn find_user(&self, org_id: &str, user_id: &str) -> Result<Option<User>> {
    let org = org_id.to_owned();
    let uid = user_id.to_owned();

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, user_id, org_id, email, full_name, created_at
               FROM users WHERE org_id = ?1 AND user_id = ?2",
              rusqlite::params![org, uid],
              read_user_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn upsert_user(&self, input: NewUser) -> Result<User> {
    let id_str      = encode_uuid(Uuid::new_v4());
    let created_str = encode_dt(Utc::now());
    let user_id     = input.user_id;
    let org_id      = input.org_id;
    let email       = input.email;
    let full_name   = input.full_name;

    let raw: RawUser = self
      .conn
      .call(move |conn| {
        // The unique constraint makes concurrent first-ingestion races
        // collapse onto one row; losers read the winner's row back.
        conn.execute(
          "INSERT INTO users (id, user_id, org_id, email, full_name, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (org_id, user_id) DO NOTHING",
          rusqlite::params![id_str, user_id, org_id, email, full_name, created_str],
        )?;
        Ok(conn.query_row(
          "SELECT id, user_id, org_id, email, full_name, created_at
           FROM users WHERE org_id = ?1 AND user_id = ?2",
          rusqlite::params![org_id, user_id],
          read_user_row,
        )?)
      })
      .await?;

    raw.into_user()
  }

  async fn find_knowledge_base(
    &self,
    org_id: &str,
  ) -> Result<Option<KnowledgeBase>> {
    let org = org_id.to_owned();

    let raw: Option<RawKnowledgeBase> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, org_id, name, created_at, updated_at
               FROM knowledge_bases WHERE org_id = ?1",
              rusqlite::params![org],
              read_kb_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawKnowledgeBase::into_knowledge_base).transpose()
  }

  async fn upsert_knowledge_base(
    &self,
    org_id: &str,
    name: &str,
  ) -> Result<KnowledgeBase> {
    let id_str  = encode_uuid(Uuid::new_v4());
    let now_str = encode_dt(Utc::now());
    let org     = org_id.to_owned();
    let kb_name = name.to_owned();

    let raw: RawKnowledgeBase = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO knowledge_bases (id, org_id, name, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (org_id) DO NOTHING",
          rusqlite::params![id_str, org, kb_name, now_str],
        )?;
        Ok(conn.query_row(
          "SELECT id, org_id, name, created_at, updated_at
           FROM knowledge_bases WHERE org_id = ?1",
          rusqlite::params![org],
          read_kb_row,
        )?)
      })
      .await?;

    raw.into_knowledge_base()
  }

  // ── Permission edges ──────────────────────────────────────────────────────

  async fn permission_role(
    &self,
    user_key: Uuid,
    kb_key: Uuid,
  ) -> Result<Option<Role>> {
    let user_str = encode_uuid(user_key);
    let kb_str   = encode_uuid(kb_key);

    let role_str: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT role FROM permissions WHERE user_key = ?1 AND kb_key = ?2",
              rusqlite::params![user_str, kb_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    role_str.as_deref().map(decode_role).transpose()
  }

  async fn upsert_permission(
    &self,
    user_key: Uuid,
    kb_key: Uuid,
    relationship_type: RelationshipType,
    role: Role,
  ) -> Result<Permission> {
    let user_str = encode_uuid(user_key);
    let kb_str   = encode_uuid(kb_key);
    let rel_str  = relationship_type.as_str().to_owned();
    let role_str = role.as_str().to_owned();
    let now_str  = encode_dt(Utc::now());

    let raw: RawPermission = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO permissions
             (user_key, kb_key, role, relationship_type, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (user_key, kb_key) DO UPDATE SET
             role = excluded.role,
             relationship_type = excluded.relationship_type",
          rusqlite::params![user_str, kb_str, role_str, rel_str, now_str],
        )?;
        Ok(conn.query_row(
          "SELECT user_key, kb_key, role, relationship_type, created_at
           FROM permissions WHERE user_key = ?1 AND kb_key = ?2",
          rusqlite::params![user_str, kb_str],
          |row| {
            Ok(RawPermission {
              user_key:          row.get(0)?,
              kb_key:            row.get(1)?,
              role:              row.get(2)?,
              relationship_type: row.get(3)?,
              created_at:        row.get(4)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_permission()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn insert_records(
    &self,
    pairs: Vec<(NewRecord, NewFileRecord)>,
  ) -> Result<Vec<(Record, FileRecord)>> {
    let now = Utc::now();

    let built: Vec<(Record, FileRecord)> = pairs
      .into_iter()
      .map(|(nr, nf)| {
        let record = Record {
          id:                 Uuid::new_v4(),
          org_id:             nr.org_id,
          record_name:        nr.record_name,
          external_record_id: nr.external_record_id,
          record_type:        nr.record_type,
          origin:             nr.origin,
          version:            1,
          indexing_status:    IndexingStatus::NotStarted,
          is_deleted:         false,
          is_archived:        false,
          created_at:         now,
          updated_at:         now,
          deleted_at:         None,
          deleted_by:         None,
          archived_by:        None,
          archived_at:        None,
        };
        let file = FileRecord {
          id:                Uuid::new_v4(),
          org_id:            nf.org_id,
          file_name:         nf.file_name,
          extension:         nf.extension,
          mime_type:         nf.mime_type,
          size_in_bytes:     nf.size_in_bytes,
          web_url:           nf.web_url,
          is_latest_version: true,
          created_at:        now,
          updated_at:        now,
        };
        (record, file)
      })
      .collect();

    let to_insert = built.clone();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (record, file) in &to_insert {
          let rec_id  = encode_uuid(record.id);
          let file_id = encode_uuid(file.id);
          let at_str  = encode_dt(record.created_at);
          tx.execute(
            "INSERT INTO records (
               id, org_id, record_name, external_record_id, record_type,
               origin, version, indexing_status, is_deleted, is_archived,
               created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            rusqlite::params![
              rec_id,
              record.org_id,
              record.record_name,
              record.external_record_id,
              record.record_type.as_str(),
              record.origin.as_str(),
              record.version as i64,
              record.indexing_status.as_str(),
              record.is_deleted,
              record.is_archived,
              at_str,
            ],
          )?;
          tx.execute(
            "INSERT INTO file_records (
               id, org_id, file_name, extension, mime_type, size_in_bytes,
               web_url, is_latest_version, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            rusqlite::params![
              file_id,
              file.org_id,
              file.file_name,
              file.extension,
              file.mime_type,
              file.size_in_bytes as i64,
              file.web_url,
              file.is_latest_version,
              at_str,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(built)
  }

  async fn add_record_to_kb(&self, record_key: Uuid, kb_key: Uuid) -> Result<()> {
    let rec_str = encode_uuid(record_key);
    let kb_str  = encode_uuid(kb_key);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        // Membership is written once and never reassigned; a second call
        // for the same record is a no-op.
        conn.execute(
          "INSERT OR IGNORE INTO kb_edges (record_key, kb_key, created_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![rec_str, kb_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn link_file_record(&self, record_key: Uuid, file_key: Uuid) -> Result<()> {
    let rec_str  = encode_uuid(record_key);
    let file_str = encode_uuid(file_key);
    let now_str  = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO file_edges (record_key, file_key, created_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![rec_str, file_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_record(
    &self,
    org_id: &str,
    record_key: Uuid,
  ) -> Result<Option<RecordBundle>> {
    let org     = org_id.to_owned();
    let key_str = encode_uuid(record_key);

    let raw: Option<(RawRecord, Option<RawFileRecord>)> = self
      .conn
      .call(move |conn| {
        let record = conn
          .query_row(
            &format!(
              "SELECT {RECORD_COLS} FROM records WHERE id = ?1 AND org_id = ?2"
            ),
            rusqlite::params![key_str, org],
            read_record_row,
          )
          .optional()?;

        let Some(record) = record else {
          return Ok(None);
        };

        let file = conn
          .query_row(
            "SELECT f.id, f.org_id, f.file_name, f.extension, f.mime_type,
                    f.size_in_bytes, f.web_url, f.is_latest_version,
                    f.created_at, f.updated_at
             FROM file_records f
             JOIN file_edges e ON e.file_key = f.id
             WHERE e.record_key = ?1",
            rusqlite::params![key_str],
            read_file_record_row,
          )
          .optional()?;

        Ok(Some((record, file)))
      })
      .await?;

    match raw {
      None => Ok(None),
      Some((record, file)) => Ok(Some(RecordBundle {
        record:      record.into_record()?,
        file_record: file.map(RawFileRecord::into_file_record).transpose()?,
      })),
    }
  }

  async fn list_records(
    &self,
    org_id: &str,
    query: &RecordQuery,
  ) -> Result<RecordPage> {
    let org   = org_id.to_owned();
    let q     = query.clone();
    let page  = q.page.max(1);
    let limit = q.limit.clamp(1, 100);

    let (raws, total): (Vec<RawRecord>, i64) = self
      .conn
      .call(move |conn| {
        // Build WHERE clause dynamically; every bound value is TEXT.
        let mut conds: Vec<String> =
          vec!["org_id = ?1".into(), "is_deleted = 0".into()];
        let mut params: Vec<String> = vec![org];

        if let Some(text) = &q.search {
          params.push(format!("%{text}%"));
          conds.push(format!("record_name LIKE ?{}", params.len()));
        }
        if !q.record_types.is_empty() {
          let marks: Vec<String> = q
            .record_types
            .iter()
            .map(|t| {
              params.push(t.as_str().to_owned());
              format!("?{}", params.len())
            })
            .collect();
          conds.push(format!("record_type IN ({})", marks.join(", ")));
        }
        if !q.origins.is_empty() {
          let marks: Vec<String> = q
            .origins
            .iter()
            .map(|o| {
              params.push(o.as_str().to_owned());
              format!("?{}", params.len())
            })
            .collect();
          conds.push(format!("origin IN ({})", marks.join(", ")));
        }
        if !q.indexing_status.is_empty() {
          let marks: Vec<String> = q
            .indexing_status
            .iter()
            .map(|s| {
              params.push(s.as_str().to_owned());
              format!("?{}", params.len())
            })
            .collect();
          conds.push(format!("indexing_status IN ({})", marks.join(", ")));
        }
        if let Some(from) = q.date_from {
          params.push(encode_dt(from));
          conds.push(format!("created_at >= ?{}", params.len()));
        }
        if let Some(to) = q.date_to {
          params.push(encode_dt(to));
          conds.push(format!("created_at <= ?{}", params.len()));
        }

        let where_clause = conds.join(" AND ");

        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM records WHERE {where_clause}"),
          rusqlite::params_from_iter(params.iter()),
          |r| r.get(0),
        )?;

        let order_col = match q.sort_by {
          SortBy::CreatedAt => "created_at",
          SortBy::UpdatedAt => "updated_at",
          SortBy::RecordName => "record_name",
        };
        let order_dir = match q.sort_order {
          SortOrder::Asc => "ASC",
          SortOrder::Desc => "DESC",
        };
        let offset = (page as i64 - 1) * limit as i64;

        let sql = format!(
          "SELECT {RECORD_COLS} FROM records WHERE {where_clause}
           ORDER BY {order_col} {order_dir} LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), read_record_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((rows, total))
      })
      .await?;

    let records = raws
      .into_iter()
      .map(RawRecord::into_record)
      .collect::<Result<Vec<_>>>()?;

    Ok(RecordPage { records, total_count: total as u64, page, limit })
  }

  async fn update_record(&self, record: &Record) -> Result<()> {
    // Immutable columns (org_id, external_record_id, record_type, origin,
    // created_at) are deliberately absent from the SET list.
    let id_str          = encode_uuid(record.id);
    let record_name     = record.record_name.clone();
    let version         = record.version as i64;
    let indexing_status = record.indexing_status.as_str().to_owned();
    let is_deleted      = record.is_deleted;
    let is_archived     = record.is_archived;
    let updated_str     = encode_dt(record.updated_at);
    let deleted_str     = record.deleted_at.map(encode_dt);
    let deleted_by      = record.deleted_by.clone();
    let archived_by     = record.archived_by.clone();
    let archived_str    = record.archived_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE records SET
             record_name = ?2, version = ?3, indexing_status = ?4,
             is_deleted = ?5, is_archived = ?6, updated_at = ?7,
             deleted_at = ?8, deleted_by = ?9, archived_by = ?10,
             archived_at = ?11
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            record_name,
            version,
            indexing_status,
            is_deleted,
            is_archived,
            updated_str,
            deleted_str,
            deleted_by,
            archived_by,
            archived_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_file_record(&self, file: &FileRecord) -> Result<()> {
    let id_str            = encode_uuid(file.id);
    let file_name         = file.file_name.clone();
    let extension         = file.extension.clone();
    let mime_type         = file.mime_type.clone();
    let size_in_bytes     = file.size_in_bytes as i64;
    let web_url           = file.web_url.clone();
    let is_latest_version = file.is_latest_version;
    let updated_str       = encode_dt(file.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE file_records SET
             file_name = ?2, extension = ?3, mime_type = ?4,
             size_in_bytes = ?5, web_url = ?6, is_latest_version = ?7,
             updated_at = ?8
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            file_name,
            extension,
            mime_type,
            size_in_bytes,
            web_url,
            is_latest_version,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  async fn records_without_kb_edge(&self, limit: u32) -> Result<Vec<Record>> {
    let limit = limit as i64;

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT r.id, r.org_id, r.record_name, r.external_record_id,
                  r.record_type, r.origin, r.version, r.indexing_status,
                  r.is_deleted, r.is_archived, r.created_at, r.updated_at,
                  r.deleted_at, r.deleted_by, r.archived_by, r.archived_at
           FROM records r
           LEFT JOIN kb_edges e ON e.record_key = r.id
           WHERE e.record_key IS NULL
           ORDER BY r.created_at ASC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], read_record_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}

// ─── Row readers ─────────────────────────────────────────────────────────────

pub(crate) fn read_user_row(row: &rusqlite::Row) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    id:         row.get(0)?,
    user_id:    row.get(1)?,
    org_id:     row.get(2)?,
    email:      row.get(3)?,
    full_name:  row.get(4)?,
    created_at: row.get(5)?,
  })
}

pub(crate) fn read_kb_row(
  row: &rusqlite::Row,
) -> rusqlite::Result<RawKnowledgeBase> {
  Ok(RawKnowledgeBase {
    id:         row.get(0)?,
    org_id:     row.get(1)?,
    name:       row.get(2)?,
    created_at: row.get(3)?,
    updated_at: row.get(4)?,
  })
}

pub(crate) fn read_record_row(row: &rusqlite::Row) -> rusqlite::Result<RawRecord> {
  Ok(RawRecord {
    id:                 row.get(0)?,
    org_id:             row.get(1)?,
    record_name:        row.get(2)?,
    external_record_id: row.get(3)?,
    record_type:        row.get(4)?,
    origin:             row.get(5)?,
    version:            row.get(6)?,
    indexing_status:    row.get(7)?,
    is_deleted:         row.get(8)?,
    is_archived:        row.get(9)?,
    created_at:         row.get(10)?,
    updated_at:         row.get(11)?,
    deleted_at:         row.get(12)?,
    deleted_by:         row.get(13)?,
    archived_by:        row.get(14)?,
    archived_at:        row.get(15)?,
  })
}

pub(crate) fn read_file_record_row(
  row: &rusqlite::Row,
) -> rusqlite::Result<RawFileRecord> {
  Ok(RawFileRecord {
    id:                row.get(0)?,
    org_id:            row.get(1)?,
    file_name:         row.get(2)?,
    extension:         row.get(3)?,
    mime_type:         row.get(4)?,
    size_in_bytes:     row.get(5)?,
    web_url:           row.get(6)?,
    is_latest_version: row.get(7)?,
    created_at:        row.get(8)?,
    updated_at:        row.get(9)?,
  })
}
