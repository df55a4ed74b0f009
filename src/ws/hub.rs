//! Outbound queues of every live connection

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::room::RoomSnapshot;
use crate::user::UserId;

use super::protocol::ServerMsg;

/// Capacity of one connection's outbound queue
pub const OUTBOUND_QUEUE: usize = 64;

/// Maps users to the sender half of their connection's outbound queue
pub struct ConnectionHub {
    conns: DashMap<UserId, mpsc::Sender<String>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
        }
    }

    pub fn attach(&self, user_id: &str, tx: mpsc::Sender<String>) {
        self.conns.insert(user_id.to_string(), tx);
    }

    /// Drop the sender; the connection's writer ends once its queue drains
    pub fn detach(&self, user_id: &str) {
        self.conns.remove(user_id);
    }

    /// Queue one message for one user. Never waits: a full queue drops the
    /// message.
    pub fn send(&self, user_id: &str, msg: &ServerMsg<'_>) {
        match msg.to_json() {
            Ok(json) => self.push(user_id, json),
            Err(e) => error!(user_id = %user_id, error = %e, "Failed to encode message"),
        }
    }

    /// Send the snapshot to every member, each copy addressed to its
    /// recipient
    pub fn broadcast_state(&self, snapshot: &RoomSnapshot) {
        for user in &snapshot.users {
            self.send(&user.id, &ServerMsg::StateUpdate(snapshot.view_for(&user.id)));
        }
    }

    /// Like [`broadcast_state`](Self::broadcast_state), but the newcomer
    /// gets `joined` instead of `state_update`
    pub fn announce_join(&self, snapshot: &RoomSnapshot, newcomer: &str) {
        for user in &snapshot.users {
            let view = snapshot.view_for(&user.id);
            let msg = if user.id == newcomer {
                ServerMsg::Joined(view)
            } else {
                ServerMsg::StateUpdate(view)
            };
            self.send(&user.id, &msg);
        }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    fn push(&self, user_id: &str, json: String) {
        let Some(tx) = self.conns.get(user_id).map(|tx| tx.clone()) else {
            return;
        };
        match tx.try_send(json) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %user_id, "Outbound queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.conns.remove(user_id);
            }
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_without_blocking() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::channel(1);
        hub.attach("u1", tx);

        let msg = ServerMsg::NameSet { user_name: "a" };
        hub.send("u1", &msg);
        hub.send("u1", &msg);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_connections_are_pruned() {
        let hub = ConnectionHub::new();
        let (tx, rx) = mpsc::channel(4);
        hub.attach("u1", tx);
        drop(rx);

        hub.send("u1", &ServerMsg::Left { room_id: "r" });
        assert!(hub.is_empty());
    }
}
