//! Stream consumer that turns record events into notifications.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use trove_core::event::{
  EventStream, NewNotification, NotificationStore, StreamEvent,
};

use crate::gateway::LiveGateway;

/// Error type event handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Drains the event stream in order, persisting each event as a
/// notification and pushing it to the assigned user's live connections.
///
/// Per event: the handler runs first, and a handler failure stops the batch
/// before the commit, so the same event is retried on the next poll. The
/// notification is persisted next (a persist failure also blocks the
/// commit). Live delivery comes last; its outcome never affects the commit.
pub struct Consumer<S, F> {
  name:          String,
  store:         Arc<S>,
  gateway:       Arc<LiveGateway>,
  handler:       F,
  poll_interval: Duration,
  batch_size:    u32,
}

impl<S, F, Fut> Consumer<S, F>
where
  S: EventStream + NotificationStore,
  F: Fn(StreamEvent) -> Fut + Send + Sync,
  Fut: Future<Output = Result<(), HandlerError>> + Send,
{
  pub fn new(
    name: impl Into<String>,
    store: Arc<S>,
    gateway: Arc<LiveGateway>,
    handler: F,
  ) -> Self {
    Self {
      name: name.into(),
      store,
      gateway,
      handler,
      poll_interval: Duration::from_secs(1),
      batch_size: 32,
    }
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn with_batch_size(mut self, n: u32) -> Self {
    self.batch_size = n.max(1);
    self
  }

  /// Run the polling loop until a shutdown signal arrives.
  pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
    info!(consumer = %self.name, "consumer started");

    loop {
      tokio::select! {
        _ = shutdown.recv() => {
          info!(consumer = %self.name, "consumer shutting down");
          break;
        }
        _ = tokio::time::sleep(self.poll_interval) => {
          self.tick().await;
        }
      }
    }
  }

  /// Process one batch, stopping at the first event that cannot be fully
  /// processed so the cursor stays on the last good one.
  pub(crate) async fn tick(&self) {
    let after = match self.store.committed(&self.name).await {
      Ok(seq) => seq,
      Err(err) => {
        error!(consumer = %self.name, error = %err, "reading commit cursor failed");
        return;
      }
    };
    let events = match self.store.fetch_after(after, self.batch_size).await {
      Ok(events) => events,
      Err(err) => {
        error!(consumer = %self.name, error = %err, "fetching events failed");
        return;
      }
    };

    for event in events {
      if !self.process(event).await {
        break;
      }
    }
  }

  /// Returns `false` when the event could not be fully processed and the
  /// batch must stop without committing it.
  async fn process(&self, event: StreamEvent) -> bool {
    let seq = event.seq;

    if let Err(err) = (self.handler)(event.clone()).await {
      warn!(
        consumer = %self.name,
        seq,
        error = %err,
        "handler failed, event will be retried"
      );
      return false;
    }

    if let Some(user_id) = &event.assigned_to {
      let notification = NewNotification {
        seq,
        org_id:  event.org_id.clone(),
        user_id: user_id.clone(),
        event:   event.event.clone(),
        payload: event.payload.clone(),
      };
      if let Err(err) = self.store.append(notification).await {
        warn!(
          consumer = %self.name,
          seq,
          error = %err,
          "persisting notification failed"
        );
        return false;
      }
      if !self.gateway.send_to_user(user_id, &event.event, &event.payload) {
        debug!(consumer = %self.name, user = %user_id, "no live connection");
      }
    }

    if let Err(err) = self.store.commit(&self.name, seq).await {
      warn!(consumer = %self.name, seq, error = %err, "commit failed");
      return false;
    }
    true
  }
}
