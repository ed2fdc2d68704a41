//! Presence fan-out.
//!
//! Every online client holds a view of who else is online. The view is
//! personalized: a client never sees itself in the set. Broadcasts happen
//! only when the online set actually changes; a connection that merely
//! replaces another one for the same identity gets a fresh snapshot
//! without waking everyone else.

use axum::extract::ws::Message;
use duochat_proto::event::{self, ServerEvent};

use crate::relay::{RelayState, send_to_identity};
use crate::store::MessageStore;

/// Sends every online client the current presence set, excluding itself.
///
/// Takes one registry snapshot and fans out from it, so every recipient
/// sees the same set.
pub async fn broadcast_all<S: MessageStore>(state: &RelayState<S>) {
    let entries = state.registry.entries().await;
    let online: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();

    for (identity, sender) in &entries {
        let visible: Vec<String> = online
            .iter()
            .filter(|id| id.as_str() != identity.as_str())
            .cloned()
            .collect();
        match event::encode_server(&ServerEvent::Presence { online: visible }) {
            Ok(bytes) => {
                let _ = sender.send(Message::Binary(bytes.into()));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode presence frame");
                return;
            }
        }
    }

    tracing::debug!(online = online.len(), "presence broadcast");
}

/// Sends one client its current presence view (the online set minus itself).
pub async fn send_snapshot<S: MessageStore>(state: &RelayState<S>, identity: &str) {
    let visible: Vec<String> = state
        .registry
        .online()
        .await
        .into_iter()
        .filter(|id| id.as_str() != identity)
        .collect();
    send_to_identity(state, identity, &ServerEvent::Presence { online: visible }).await;
}
