//! SQLite backend for the Trove graph store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. One [`SqliteStore`] implements
//! every persistence trait the service needs: the graph store, the transfer
//! queue, the event stream, and the notification log.

mod encode;
mod schema;
mod store;
mod stream;
mod transfer;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
