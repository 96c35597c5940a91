//! SQL schema for the Trove SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! Nodes (users, knowledge bases, records, file records) and edges
//! (permissions, kb membership, record-to-file links) live in separate
//! tables. Edge rows for a record are written after the node transaction,
//! so a `records` row with no `kb_edges` row is a legal transient state.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,   -- identity-provider key
    org_id      TEXT NOT NULL,
    email       TEXT NOT NULL,
    full_name   TEXT,
    created_at  TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    UNIQUE (org_id, user_id)
);

CREATE TABLE IF NOT EXISTS knowledge_bases (
    id          TEXT PRIMARY KEY,
    org_id      TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Permission edges: User —(role)→ KnowledgeBase.
-- One edge per pair; re-granting overwrites the role in place.
CREATE TABLE IF NOT EXISTS permissions (
    user_key          TEXT NOT NULL REFERENCES users(id),
    kb_key            TEXT NOT NULL REFERENCES knowledge_bases(id),
    role              TEXT NOT NULL,   -- 'OWNER' | 'WRITER' | ...
    relationship_type TEXT NOT NULL DEFAULT 'USER',
    created_at        TEXT NOT NULL,
    PRIMARY KEY (user_key, kb_key)
);

-- Records are soft-deleted only; no DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS records (
    id                 TEXT PRIMARY KEY,
    org_id             TEXT NOT NULL,
    record_name        TEXT NOT NULL,
    external_record_id TEXT NOT NULL,
    record_type        TEXT NOT NULL,   -- 'FILE' | 'WEBPAGE' | ...
    origin             TEXT NOT NULL,   -- 'UPLOAD' | 'CONNECTOR'
    version            INTEGER NOT NULL DEFAULT 1,
    indexing_status    TEXT NOT NULL DEFAULT 'NOT_STARTED',
    is_deleted         INTEGER NOT NULL DEFAULT 0,
    is_archived        INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    deleted_at         TEXT,
    deleted_by         TEXT,
    archived_by        TEXT,
    archived_at        TEXT
);

CREATE TABLE IF NOT EXISTS file_records (
    id                TEXT PRIMARY KEY,
    org_id            TEXT NOT NULL,
    file_name         TEXT NOT NULL,
    extension         TEXT,
    mime_type         TEXT,
    size_in_bytes     INTEGER NOT NULL,
    web_url           TEXT,
    is_latest_version INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- Membership edges: Record —(belongs-to)→ KnowledgeBase.
-- Written once per record, never reassigned.
CREATE TABLE IF NOT EXISTS kb_edges (
    record_key TEXT PRIMARY KEY REFERENCES records(id),
    kb_key     TEXT NOT NULL REFERENCES knowledge_bases(id),
    created_at TEXT NOT NULL
);

-- Type edges: Record —(is-of-type)→ FileRecord.
CREATE TABLE IF NOT EXISTS file_edges (
    record_key TEXT PRIMARY KEY REFERENCES records(id),
    file_key   TEXT NOT NULL UNIQUE REFERENCES file_records(id),
    created_at TEXT NOT NULL
);

-- Durable queue of asynchronous storage transfers. Holds the full byte
-- buffer so an interrupted transfer can be replayed after a restart.
CREATE TABLE IF NOT EXISTS transfers (
    id            TEXT PRIMARY KEY,
    record_key    TEXT NOT NULL,
    org_id        TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    target_url    TEXT NOT NULL,
    document_id   TEXT NOT NULL,
    document_name TEXT NOT NULL,
    content_type  TEXT NOT NULL,
    body          BLOB NOT NULL,
    attempts      INTEGER NOT NULL DEFAULT 0,
    max_attempts  INTEGER NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    last_error    TEXT,
    next_run_at   TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Append-only event stream; seq doubles as the consumer commit cursor.
CREATE TABLE IF NOT EXISTS stream_events (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    event       TEXT NOT NULL,
    org_id      TEXT NOT NULL,
    assigned_to TEXT,
    payload     TEXT NOT NULL,   -- JSON
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stream_offsets (
    consumer      TEXT PRIMARY KEY,
    committed_seq INTEGER NOT NULL
);

-- Notifications are append-only; no UPDATE or DELETE is ever issued.
-- UNIQUE(seq) makes a replayed append after a consumer crash a no-op.
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY,
    seq        INTEGER NOT NULL UNIQUE,   -- stream position
    org_id     TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    event      TEXT NOT NULL,
    payload    TEXT NOT NULL,    -- JSON
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_org_idx        ON records(org_id);
CREATE INDEX IF NOT EXISTS records_created_idx    ON records(created_at);
CREATE INDEX IF NOT EXISTS transfers_due_idx      ON transfers(status, next_run_at);
CREATE INDEX IF NOT EXISTS notifications_user_idx ON notifications(org_id, user_id, seq);

PRAGMA user_version = 1;
";
