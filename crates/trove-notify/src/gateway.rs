//! Registry of active live-push connections.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use trove_core::event::PushCommand;
use uuid::Uuid;

/// One live connection's sending half.
#[derive(Debug, Clone)]
struct Connection {
  id:     Uuid,
  sender: mpsc::UnboundedSender<PushCommand>,
}

/// Live connections indexed by user and by org.
///
/// A connection registers under both its user and its org on connect and is
/// removed on disconnect. Senders whose receiving half is gone are pruned
/// during delivery. Both indexes lock per shard, so concurrent
/// connect/disconnect/send never serialise globally.
#[derive(Debug, Default)]
pub struct LiveGateway {
  users: DashMap<String, Vec<Connection>>,
  orgs:  DashMap<String, Vec<Connection>>,
}

impl LiveGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a connection under `user_id` and `org_id`. The returned id is
  /// the handle for [`Self::unregister`].
  pub fn register(
    &self,
    user_id: &str,
    org_id: &str,
    sender: mpsc::UnboundedSender<PushCommand>,
  ) -> Uuid {
    let id = Uuid::new_v4();
    let connection = Connection { id, sender };
    self
      .users
      .entry(user_id.to_owned())
      .or_default()
      .push(connection.clone());
    self
      .orgs
      .entry(org_id.to_owned())
      .or_default()
      .push(connection);
    id
  }

  /// Remove a connection from both indexes.
  pub fn unregister(&self, user_id: &str, org_id: &str, id: Uuid) {
    if let Some(mut connections) = self.users.get_mut(user_id) {
      connections.retain(|c| c.id != id);
    }
    if let Some(mut connections) = self.orgs.get_mut(org_id) {
      connections.retain(|c| c.id != id);
    }
  }

  /// Push to every connection of one user. `false` means the user has no
  /// live connection.
  pub fn send_to_user(&self, user_id: &str, event: &str, data: &Value) -> bool {
    let command = command(event, data);
    match self.users.get_mut(user_id) {
      Some(mut connections) => deliver(&mut connections, &command) > 0,
      None => false,
    }
  }

  /// Push to every connection registered under an org.
  pub fn send_to_org(&self, org_id: &str, event: &str, data: &Value) -> bool {
    let command = command(event, data);
    match self.orgs.get_mut(org_id) {
      Some(mut connections) => deliver(&mut connections, &command) > 0,
      None => false,
    }
  }

  /// Push to every connection. Returns how many received it.
  pub fn broadcast_to_all(&self, event: &str, data: &Value) -> usize {
    let command = command(event, data);
    let mut delivered = 0;
    for mut entry in self.users.iter_mut() {
      delivered += deliver(entry.value_mut(), &command);
    }
    delivered
  }

  pub fn connection_count(&self) -> usize {
    self.users.iter().map(|entry| entry.value().len()).sum()
  }
}

fn command(event: &str, data: &Value) -> PushCommand {
  PushCommand { event: event.to_owned(), data: data.clone() }
}

/// Send to each connection, dropping the ones whose receiver is gone.
/// Returns how many connections took the command.
fn deliver(connections: &mut Vec<Connection>, command: &PushCommand) -> usize {
  connections.retain(|c| c.sender.send(command.clone()).is_ok());
  connections.len()
}
