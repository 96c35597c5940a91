//! Users, knowledge bases, and the permission edges that connect them.
//!
//! A knowledge base is the per-organisation container of records. Users reach
//! it through permission edges carrying a role; the role decides which record
//! operations the holder may perform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Roles ───────────────────────────────────────────────────────────────────

/// Role carried by a permission edge from a user to a knowledge base.
/// The variants mirror drive-style sharing levels; `Owner` is strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
  Owner,
  Organizer,
  FileOrganizer,
  Writer,
  Commenter,
  Reader,
}

/// Roles allowed to mutate records: update, archive, soft-delete, and
/// file-version replacement. Read access only requires any edge at all.
pub const WRITE_ROLES: &[Role] =
  &[Role::Owner, Role::Organizer, Role::FileOrganizer, Role::Writer];

/// Every role; used where holding any permission edge is sufficient.
pub const ANY_ROLE: &[Role] = &[
  Role::Owner,
  Role::Organizer,
  Role::FileOrganizer,
  Role::Writer,
  Role::Commenter,
  Role::Reader,
];

impl Role {
  /// The discriminant string stored in the `role` column.
  /// Must match the `rename_all = "UPPERCASE"` serde tags above.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Owner => "OWNER",
      Self::Organizer => "ORGANIZER",
      Self::FileOrganizer => "FILEORGANIZER",
      Self::Writer => "WRITER",
      Self::Commenter => "COMMENTER",
      Self::Reader => "READER",
    }
  }

  /// Inverse of [`Role::as_str`]. Returns `None` for unknown discriminants.
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "OWNER" => Some(Self::Owner),
      "ORGANIZER" => Some(Self::Organizer),
      "FILEORGANIZER" => Some(Self::FileOrganizer),
      "WRITER" => Some(Self::Writer),
      "COMMENTER" => Some(Self::Commenter),
      "READER" => Some(Self::Reader),
      _ => None,
    }
  }
}

/// The relationship class of a permission edge. Only user edges exist today;
/// group and domain grants are modelled so the edge table doesn't need a
/// schema change when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipType {
  User,
  Group,
  Domain,
}

impl RelationshipType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::User => "USER",
      Self::Group => "GROUP",
      Self::Domain => "DOMAIN",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "USER" => Some(Self::User),
      "GROUP" => Some(Self::Group),
      "DOMAIN" => Some(Self::Domain),
      _ => None,
    }
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// An identity known to the service. `user_id` is the key assigned by the
/// identity provider; `id` is the graph key assigned at creation. Identity
/// fields never change after creation; profile fields may be refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id:         Uuid,
  pub user_id:    String,
  pub org_id:     String,
  pub email:      String,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub full_name:  Option<String>,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::GraphStore::upsert_user`].
/// `created_at` and the graph key are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub user_id:   String,
  pub org_id:    String,
  pub email:     String,
  pub full_name: Option<String>,
}

// ─── KnowledgeBase ───────────────────────────────────────────────────────────

/// Per-organisation container of records. Exactly one exists per org; it is
/// created lazily the first time the org ingests anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
  pub id:         Uuid,
  pub org_id:     String,
  pub name:       String,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at: DateTime<Utc>,
  #[serde(
    rename = "updatedAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub updated_at: DateTime<Utc>,
}

/// Name given to the knowledge base created on first ingestion.
pub const DEFAULT_KB_NAME: &str = "Default";

// ─── Permission edge ─────────────────────────────────────────────────────────

/// A permission edge from a user to a knowledge base. At most one edge exists
/// per (user, knowledge base) pair; granting again overwrites the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
  pub user_key:          Uuid,
  pub kb_key:            Uuid,
  pub role:              Role,
  pub relationship_type: RelationshipType,
  #[serde(
    rename = "createdAtTimestamp",
    with = "chrono::serde::ts_milliseconds"
  )]
  pub created_at:        DateTime<Utc>,
}
