//! WebSocket relay core: shared state and the per-connection lifecycle.
//!
//! Every socket follows the same path: the first binary frame must be an
//! attach request carrying a token, the relay verifies it and registers the
//! connection, then a writer task drains the connection's outbound queue
//! while a reader task dispatches inbound events. A newer attach for the
//! same identity supersedes the older connection.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use duochat_proto::event::{self, ClientEvent, ServerEvent};

use crate::assets::AssetStore;
use crate::auth::{TokenAuthority, UserDirectory};
use crate::config::RelayConfig;
use crate::delivery;
use crate::presence;
use crate::registry::ConnectionRegistry;
use crate::store::{InMemoryMessageStore, MessageStore};
use crate::unread::UnreadLedger;

/// Shared state handed to every connection and HTTP handler.
pub struct RelayState<S: MessageStore> {
    pub registry: ConnectionRegistry,
    pub unread: UnreadLedger,
    pub store: S,
    pub users: UserDirectory,
    pub tokens: TokenAuthority,
    pub assets: AssetStore,
    max_payload_size: usize,
}

impl<S: MessageStore> RelayState<S> {
    /// Creates state with default configuration and the given store.
    pub fn new(store: S) -> Self {
        Self::with_config(&RelayConfig::default(), store)
    }

    /// Creates state from resolved configuration.
    ///
    /// Without a configured secret the token authority gets a random
    /// per-process one, so tokens do not survive a restart.
    pub fn with_config(config: &RelayConfig, store: S) -> Self {
        let tokens = match &config.jwt_secret {
            Some(secret) => TokenAuthority::new(secret.as_bytes(), config.token_ttl_secs),
            None => TokenAuthority::generate(config.token_ttl_secs),
        };
        Self {
            registry: ConnectionRegistry::new(),
            unread: UnreadLedger::new(),
            store,
            users: UserDirectory::new(),
            tokens,
            assets: AssetStore::new(config.upload_dir.clone(), config.max_upload_size),
            max_payload_size: config.max_payload_size,
        }
    }

    /// Largest accepted message content, in bytes.
    #[must_use]
    pub const fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

/// Queues an event on an identity's outbound channel, if online.
///
/// Best effort: encode failures and closed channels are dropped.
pub(crate) async fn send_to_identity<S: MessageStore>(
    state: &RelayState<S>,
    identity: &str,
    event: &ServerEvent,
) {
    if let Some(sender) = state.registry.sender_for(identity).await
        && let Ok(bytes) = event::encode_server(event)
    {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

/// Sends one event directly on a socket sink, bypassing the queue.
///
/// Used before the writer task exists (attach ack, refusals).
async fn send_event(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), String> {
    let bytes = event::encode_server(event).map_err(|e| e.to_string())?;
    sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Waits for the opening attach frame and returns its token.
///
/// Non-binary frames are skipped. Anything else in the first binary frame,
/// an undecodable frame, or a close ends the handshake.
async fn wait_for_attach(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match event::decode_client(&data) {
                Ok(ClientEvent::Attach { token }) => return Some(token),
                Ok(_) => {
                    tracing::warn!("first frame was not an attach request");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable first frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Drives one WebSocket connection from attach to teardown.
pub async fn handle_socket<S: MessageStore + 'static>(socket: WebSocket, state: Arc<RelayState<S>>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(token) = wait_for_attach(&mut ws_receiver).await else {
        let reason = "first frame must be an attach request".to_string();
        let _ = send_event(&mut ws_sender, &ServerEvent::Error { reason }).await;
        return;
    };

    let identity = match state.tokens.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "attach refused");
            let reason = e.to_string();
            let _ = send_event(&mut ws_sender, &ServerEvent::Error { reason }).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = state.registry.attach(&identity, tx).await;
    let conn_id = outcome.conn_id;
    let was_superseding = outcome.superseded.is_some();
    if let Some(old) = outcome.superseded {
        tracing::info!(identity = %identity, "new connection supersedes an existing one");
        let _ = old.send(Message::Close(None));
    }

    let ack = ServerEvent::Attached {
        identity: identity.clone(),
    };
    if let Err(e) = send_event(&mut ws_sender, &ack).await {
        tracing::error!(identity = %identity, error = %e, "failed to send attach ack");
        state.registry.detach(&identity, conn_id).await;
        return;
    }
    tracing::info!(identity = %identity, conn_id = %conn_id, "connection attached");

    // A supersede does not change the online set, so only the new
    // connection needs a snapshot.
    if was_superseding {
        presence::send_snapshot(&state, &identity).await;
    } else {
        presence::broadcast_all(&state).await;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let reader_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_client_event(&reader_identity, &data, &reader_state).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // The conn id guard makes this a no-op when a newer connection
    // already took over the identity.
    if state.registry.detach(&identity, conn_id).await {
        presence::broadcast_all(&state).await;
        tracing::info!(identity = %identity, "connection detached");
    } else {
        tracing::debug!(identity = %identity, "connection closed after being superseded");
    }
}

/// Dispatches one decoded client event.
async fn handle_client_event<S: MessageStore>(identity: &str, data: &[u8], state: &RelayState<S>) {
    match event::decode_client(data) {
        Ok(ClientEvent::Send {
            to,
            kind,
            content,
            client_sent_at,
        }) => {
            delivery::send_directed(state, identity, &to, kind, content, client_sent_at).await;
        }
        Ok(ClientEvent::Typing { to, is_typing }) => {
            delivery::forward_typing(state, identity, &to, is_typing).await;
        }
        Ok(ClientEvent::Read { author }) => {
            delivery::apply_read_receipt(state, identity, &author).await;
        }
        Ok(ClientEvent::PullUnread) => {
            let counts = state.unread.snapshot(identity).await;
            send_to_identity(state, identity, &ServerEvent::Unread { counts }).await;
        }
        Ok(ClientEvent::Attach { .. }) => {
            tracing::warn!(identity = %identity, "duplicate attach ignored");
        }
        Err(e) => {
            tracing::warn!(identity = %identity, error = %e, "undecodable client frame");
        }
    }
}

/// Starts a relay with in-memory storage on `addr`.
///
/// Returns the bound address and the server task handle.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error + Send + Sync>> {
    let state = Arc::new(RelayState::new(InMemoryMessageStore::new()));
    start_server_with_state(addr, state).await
}

/// Starts a relay on `addr` with caller-provided state.
///
/// Tests use this to keep a handle on the state for inspection.
pub async fn start_server_with_state<S: MessageStore + 'static>(
    addr: &str,
    state: Arc<RelayState<S>>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn Error + Send + Sync>> {
    let app = crate::http::router(state);
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server terminated");
        }
    });
    Ok((local_addr, handle))
}
