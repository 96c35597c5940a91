//! Storage hand-off for uploaded files.
//!
//! Three pieces cooperate here. [`StorageClient`] speaks the storage
//! service's document API: small uploads come back with their final
//! identity, large ones answer with a redirect and a provisional identity.
//! The redirected bytes become durable queue items that a
//! [`TransferWorker`] drives to completion in the background. Terminal
//! outcomes are pushed to the uploader through the [`NotifierClient`],
//! best-effort.

mod client;
mod notify;
mod worker;

pub mod error;

pub use client::{
  DocumentRef, FileUpload, PendingTransfer, StorageClient, StorageUpload,
};
pub use error::{Error, Result};
pub use notify::{NotifierClient, TransferOutcome};
pub use worker::{TransferWorker, UPLOAD_STATUS_EVENT};
