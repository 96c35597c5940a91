//! Domain layer over the graph store: users, knowledge bases, permission
//! checks, and the record lifecycle.
//!
//! Everything here is generic over [`trove_core::store::GraphStore`], so the
//! same service runs against the SQLite backend in production and against an
//! in-memory database in tests.

mod service;

pub use service::{NewFileVersion, RelationService};

#[cfg(test)]
mod tests;
