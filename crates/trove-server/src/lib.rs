//! Process assembly for the records service.
//!
//! Opens the SQLite store, recovers interrupted work, builds the shared
//! [`AppState`], and runs the HTTP server alongside the transfer worker and
//! the notification consumer. Everything a handler or background task needs
//! is constructed here and handed down; nothing reaches for globals.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use trove_api::{AppState, api_router};
use trove_core::{event::StreamEvent, transfer::TransferStore as _};
use trove_notify::{Consumer, HandlerError, LiveGateway};
use trove_relations::RelationService;
use trove_storage::{NotifierClient, StorageClient, TransferWorker};
use trove_store_sqlite::SqliteStore;

/// How many orphaned records a startup reconciliation sweep repairs.
const RECONCILE_BATCH: u32 = 256;

/// Runtime server configuration, deserialised from `config.toml` plus
/// `TROVE_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  /// Base URL of the storage service.
  pub storage_endpoint:      String,
  /// Base URL transfer-completion notifications are posted to.
  pub notification_endpoint: String,
  #[serde(default = "default_transfer_max_attempts")]
  pub transfer_max_attempts: u32,
  #[serde(default = "default_transfer_poll_ms")]
  pub transfer_poll_ms:      u64,
  #[serde(default = "default_transfer_batch_size")]
  pub transfer_batch_size:   u32,
  /// Commit-cursor name of the notification consumer.
  #[serde(default = "default_consumer_name")]
  pub consumer_name:         String,
  #[serde(default = "default_consumer_poll_ms")]
  pub consumer_poll_ms:      u64,
}

fn default_transfer_max_attempts() -> u32 {
  5
}

fn default_transfer_poll_ms() -> u64 {
  1000
}

fn default_transfer_batch_size() -> u32 {
  4
}

fn default_consumer_name() -> String {
  "record-notifications".into()
}

fn default_consumer_poll_ms() -> u64 {
  500
}

/// Run the service until a shutdown signal arrives.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
  let store = Arc::new(
    SqliteStore::open(&config.store_path)
      .await
      .with_context(|| {
        format!("failed to open store at {:?}", config.store_path)
      })?,
  );

  // Recover work interrupted by the previous process before accepting
  // traffic: stuck transfers go back to pending, and records that missed
  // their knowledge-base edge get relinked.
  let requeued = store.requeue_interrupted().await?;
  if requeued > 0 {
    info!(requeued, "requeued interrupted transfers");
  }
  let relations = RelationService::new(store.clone());
  let repaired = relations.reconcile_kb_edges(RECONCILE_BATCH).await?;
  if repaired > 0 {
    info!(repaired, "relinked orphaned records");
  }

  let gateway = Arc::new(LiveGateway::new());
  let storage = StorageClient::new(config.storage_endpoint.as_str())
    .context("failed to build storage client")?;
  let state = AppState {
    store: store.clone(),
    relations,
    storage,
    gateway: gateway.clone(),
    transfer_max_attempts: config.transfer_max_attempts,
  };

  let (shutdown_tx, _) = broadcast::channel(1);

  let worker = TransferWorker::new(
    store.clone(),
    NotifierClient::new(config.notification_endpoint.as_str())
      .context("failed to build notifier client")?,
  )
  .context("failed to build transfer worker")?
  .with_poll_interval(Duration::from_millis(config.transfer_poll_ms))
  .with_batch_size(config.transfer_batch_size);
  let worker_handle = tokio::spawn({
    let shutdown = shutdown_tx.subscribe();
    async move { worker.run(shutdown).await }
  });

  let consumer = Consumer::new(
    config.consumer_name.clone(),
    store.clone(),
    gateway,
    |event: StreamEvent| async move {
      debug!(seq = event.seq, event = %event.event, "draining stream event");
      Ok::<(), HandlerError>(())
    },
  )
  .with_poll_interval(Duration::from_millis(config.consumer_poll_ms));
  let consumer_handle = tokio::spawn({
    let shutdown = shutdown_tx.subscribe();
    async move { consumer.run(shutdown).await }
  });

  let app = api_router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", config.host, config.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("listening on http://{address}");

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // The listener is down; stop the background loops.
  let _ = shutdown_tx.send(());
  let _ = worker_handle.await;
  let _ = consumer_handle.await;
  Ok(())
}

async fn shutdown_signal() {
  let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn config_fills_in_tunable_defaults() {
    let config: ServerConfig = serde_json::from_value(serde_json::json!({
      "host": "127.0.0.1",
      "port": 8080,
      "store_path": "/tmp/trove.db",
      "storage_endpoint": "http://storage.internal",
      "notification_endpoint": "http://127.0.0.1:8080",
    }))
    .unwrap();

    assert_eq!(config.transfer_max_attempts, 5);
    assert_eq!(config.transfer_batch_size, 4);
    assert_eq!(config.consumer_name, "record-notifications");
  }

  #[test]
  fn config_rejects_missing_endpoints() {
    let err = serde_json::from_value::<ServerConfig>(serde_json::json!({
      "host": "127.0.0.1",
      "port": 8080,
      "store_path": "/tmp/trove.db",
    }))
    .unwrap_err();
    assert!(err.to_string().contains("storage_endpoint"));
  }
}
