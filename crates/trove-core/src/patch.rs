//! Update patches for records, with immutable-field protection.
//!
//! Patches arrive as raw JSON from callers. Validation happens in two steps:
//! first the key set is checked against [`IMMUTABLE_FIELDS`] so that a patch
//! touching a protected field is rejected outright, then the remainder must
//! deserialise exactly into the mutable surface ([`RecordPatch`]).

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result, record::IndexingStatus};

/// Record fields that can never be changed through the update path. The
/// graph-era aliases (`_id`, `_key`, `_rev`) stay on the list so patches
/// written against the old document shape are rejected as immutable rather
/// than unknown.
pub const IMMUTABLE_FIELDS: &[&str] = &[
  "_id",
  "_key",
  "_rev",
  "id",
  "orgId",
  "userId",
  "createdAtTimestamp",
  "externalRecordId",
  "recordType",
  "origin",
];

/// The mutable surface of a record. Everything else is either immutable or
/// owned by a dedicated operation (archive stamps, version counter).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordPatch {
  #[serde(default)]
  pub record_name:     Option<String>,
  #[serde(default)]
  pub indexing_status: Option<IndexingStatus>,
  /// `true` soft-deletes the record; the service adds the deletion stamps.
  #[serde(default)]
  pub is_deleted:      Option<bool>,
}

impl RecordPatch {
  /// Validate a raw JSON patch. Fails with [`Error::ImmutableField`] if any
  /// protected key is present, and [`Error::Validation`] if the patch is not
  /// an object or carries keys outside the mutable surface.
  pub fn from_value(value: Value) -> Result<Self> {
    let Some(map) = value.as_object() else {
      return Err(Error::Validation("patch must be a JSON object".into()));
    };
    for field in IMMUTABLE_FIELDS {
      if map.contains_key(*field) {
        return Err(Error::ImmutableField((*field).to_string()));
      }
    }
    serde_json::from_value(value).map_err(|err| Error::Validation(err.to_string()))
  }

  /// A patch with no fields set. Applying it only bumps `updatedAtTimestamp`.
  pub fn is_empty(&self) -> bool {
    self.record_name.is_none()
      && self.indexing_status.is_none()
      && self.is_deleted.is_none()
  }
}
