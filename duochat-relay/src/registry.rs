//! Connection registry mapping online identities to delivery channels.
//!
//! Each identity has at most one live connection. A new attach under an
//! already-registered identity supersedes the old connection; detach is
//! guarded by a per-connection id so a superseded connection tearing down
//! late cannot knock out its replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

/// Identifies a single WebSocket connection within the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live registration: the guarding connection id and the channel that
/// feeds the connection's WebSocket writer task.
struct Registration {
    conn_id: ConnId,
    sender: mpsc::UnboundedSender<Message>,
}

/// Outcome of registering a connection under an identity.
#[derive(Debug)]
pub struct AttachOutcome {
    /// Id guarding this registration; [`ConnectionRegistry::detach`]
    /// requires it.
    pub conn_id: ConnId,
    /// Channel of the previous connection this one replaced, if any.
    pub superseded: Option<mpsc::UnboundedSender<Message>>,
}

/// Registry of online identities and their delivery channels.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Registration>>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under an identity, superseding any previous
    /// registration for the same identity.
    pub async fn attach(
        &self,
        identity: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> AttachOutcome {
        let conn_id = ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let mut conns = self.connections.write().await;
        let superseded = conns
            .insert(identity.to_string(), Registration { conn_id, sender })
            .map(|old| old.sender);
        AttachOutcome { conn_id, superseded }
    }

    /// Removes the identity's registration, but only if it is still owned
    /// by `conn_id`. Returns whether anything was removed.
    ///
    /// A superseded connection finishing its teardown passes a stale
    /// `conn_id` and this becomes a no-op.
    pub async fn detach(&self, identity: &str, conn_id: ConnId) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(identity) {
            Some(reg) if reg.conn_id == conn_id => {
                conns.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Returns a clone of the delivery channel for the identity, if online.
    pub async fn sender_for(&self, identity: &str) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(identity).map(|reg| reg.sender.clone())
    }

    /// Returns the sorted set of online identities.
    pub async fn online(&self) -> Vec<String> {
        let conns = self.connections.read().await;
        let mut ids: Vec<String> = conns.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns every online identity with its delivery channel, sorted by
    /// identity. One consistent snapshot for fan-out paths.
    pub async fn entries(&self) -> Vec<(String, mpsc::UnboundedSender<Message>)> {
        let conns = self.connections.read().await;
        let mut entries: Vec<(String, mpsc::UnboundedSender<Message>)> = conns
            .iter()
            .map(|(id, reg)| (id.clone(), reg.sender.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
