//! The live-push websocket endpoint.
//!
//! `GET /ws` upgrades the connection and registers it with the gateway
//! under the caller's user and org. Push commands queued for either are
//! forwarded as JSON text frames until the peer disconnects.

use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppState, context::UserContext};

/// `GET /ws`
pub async fn connect<S>(
  ws: WebSocketUpgrade,
  ctx: UserContext,
  State(state): State<AppState<S>>,
) -> Response
where
  S: Clone + Send + Sync + 'static,
{
  ws.on_upgrade(move |socket| serve_connection(socket, state, ctx))
}

async fn serve_connection<S>(
  socket: WebSocket,
  state: AppState<S>,
  ctx: UserContext,
) where
  S: Clone + Send + Sync + 'static,
{
  let (mut sender, mut receiver) = socket.split();
  let (tx, mut rx) = mpsc::unbounded_channel();
  let id = state.gateway.register(&ctx.user_id, &ctx.org_id, tx);
  debug!(user_id = %ctx.user_id, connection = %id, "websocket connected");

  let send_task = tokio::spawn(async move {
    while let Some(command) = rx.recv().await {
      let payload = match serde_json::to_string(&command) {
        Ok(payload) => payload,
        Err(err) => {
          warn!(error = %err, "failed to serialise push command");
          continue;
        }
      };
      if sender.send(Message::Text(payload.into())).await.is_err() {
        break;
      }
    }
  });

  // Drain the incoming side until the peer goes away. Pings are answered
  // by axum itself.
  while let Some(Ok(message)) = receiver.next().await {
    if let Message::Close(_) = message {
      break;
    }
  }

  state.gateway.unregister(&ctx.user_id, &ctx.org_id, id);
  send_task.abort();
  debug!(user_id = %ctx.user_id, connection = %id, "websocket disconnected");
}
