//! Directed message delivery, typing relay, and read receipts.
//!
//! A send persists first and forwards second: if the append fails, the
//! sender gets an error frame and the recipient sees nothing. A message
//! that missed live delivery (recipient offline, or its channel died
//! mid-send) lands in the unread ledger instead of being forwarded.

use axum::extract::ws::Message;
use duochat_proto::event::{self, ServerEvent};
use duochat_proto::message::{
    MessageId, MessageKind, MessageRecord, Timestamp, validate_content,
};

use crate::relay::{RelayState, send_to_identity};
use crate::store::MessageStore;

/// Accepts a directed message from `from` and delivers it to `to`.
///
/// The relay assigns the message id and the authoritative `sent_at`; the
/// client-supplied timestamp rides along untouched.
pub async fn send_directed<S: MessageStore>(
    state: &RelayState<S>,
    from: &str,
    to: &str,
    kind: MessageKind,
    content: String,
    client_sent_at: Timestamp,
) {
    if let Err(e) = validate_content(&content, state.max_payload_size()) {
        tracing::warn!(from = %from, to = %to, error = %e, "rejecting message");
        let reason = e.to_string();
        send_to_identity(state, from, &ServerEvent::Error { reason }).await;
        return;
    }

    let record = MessageRecord {
        id: MessageId::new(),
        from: from.to_string(),
        to: to.to_string(),
        kind,
        content,
        sent_at: Timestamp::now(),
        client_sent_at,
        read: false,
    };

    // Persistence is the acceptance point. No append, no delivery.
    if let Err(e) = state.store.append(&record).await {
        tracing::error!(from = %from, to = %to, error = %e, "message append failed");
        let reason = format!("message not delivered: {e}");
        send_to_identity(state, from, &ServerEvent::Error { reason }).await;
        return;
    }

    if let Some(sender) = state.registry.sender_for(to).await {
        let frame = ServerEvent::Message {
            id: record.id,
            from: record.from.clone(),
            kind: record.kind,
            content: record.content.clone(),
            sent_at: record.sent_at,
            client_sent_at: record.client_sent_at,
        };
        match event::encode_server(&frame) {
            Ok(bytes) => {
                if sender.send(Message::Binary(bytes.into())).is_ok() {
                    tracing::debug!(
                        message_id = %record.id,
                        from = %from,
                        to = %to,
                        "message delivered live"
                    );
                    return;
                }
                // Channel died between the snapshot and the send; the
                // recipient counts as offline.
                tracing::warn!(to = %to, "delivery channel closed, treating recipient as offline");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode message frame");
                return;
            }
        }
    }

    let count = state.unread.increment(to, from).await;
    tracing::info!(
        message_id = %record.id,
        from = %from,
        to = %to,
        count,
        "recipient offline, unread incremented"
    );
}

/// Forwards a typing indicator to the recipient if online.
///
/// Typing is ephemeral: never persisted, never queued, silently dropped
/// for offline recipients.
pub async fn forward_typing<S: MessageStore>(
    state: &RelayState<S>,
    from: &str,
    to: &str,
    is_typing: bool,
) {
    tracing::trace!(from = %from, to = %to, is_typing, "typing indicator");
    let frame = ServerEvent::Typing {
        from: from.to_string(),
        is_typing,
    };
    send_to_identity(state, to, &frame).await;
}

/// Applies `reader`'s acknowledgment that it has read `author`'s backlog.
///
/// Marks the stored rows read, resets the unread counter, and notifies the
/// author if online. A persistence failure aborts the whole receipt: the
/// counter stays and no notification goes out.
pub async fn apply_read_receipt<S: MessageStore>(
    state: &RelayState<S>,
    reader: &str,
    author: &str,
) {
    let marked = match state.store.mark_read(author, reader).await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(reader = %reader, author = %author, error = %e, "read receipt not persisted");
            let reason = format!("read receipt failed: {e}");
            send_to_identity(state, reader, &ServerEvent::Error { reason }).await;
            return;
        }
    };

    let cleared = state.unread.clear(reader, author).await;
    tracing::debug!(
        reader = %reader,
        author = %author,
        marked,
        cleared,
        "read receipt applied"
    );

    let frame = ServerEvent::Read {
        reader: reader.to_string(),
    };
    send_to_identity(state, author, &frame).await;
}
