//! Wire protocol events exchanged between chat clients and the relay.
//!
//! Events are postcard-encoded and sent over WebSocket binary frames.
//! The relay never trusts client-supplied sender identities: the `from`
//! of every forwarded event is the identity the connection attached as.

use serde::{Deserialize, Serialize};

use crate::message::{MessageId, MessageKind, Timestamp};

/// Events sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Client presents its credential and claims an identity.
    ///
    /// Must be the first frame sent after the WebSocket connection.
    /// The relay responds with [`ServerEvent::Attached`] on success or
    /// [`ServerEvent::Error`] followed by a close on failure.
    Attach {
        /// Signed token naming the identity, obtained via HTTP login.
        token: String,
    },

    /// A directed message for exactly one recipient identity.
    Send {
        /// Recipient identity.
        to: String,
        /// Content kind.
        kind: MessageKind,
        /// Text body or image URL, depending on `kind`.
        content: String,
        /// Sender's local clock at send time, display only.
        client_sent_at: Timestamp,
    },

    /// Sender started or stopped composing toward a recipient.
    ///
    /// Ephemeral: never persisted, never queued for offline recipients.
    Typing {
        /// Recipient identity.
        to: String,
        /// True while composing, false when stopped.
        is_typing: bool,
    },

    /// The attached identity has read its backlog from `author`.
    ///
    /// Resets the unread counter for that conversation and notifies the
    /// author if online.
    Read {
        /// Identity whose messages were read.
        author: String,
    },

    /// Request a snapshot of the attached identity's unread counters.
    PullUnread,
}

/// Events sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Acknowledges a successful [`ClientEvent::Attach`].
    Attached {
        /// The identity this connection is now registered under.
        identity: String,
    },

    /// Current set of online identities, excluding the receiving client.
    ///
    /// Sent after attach and re-sent to everyone whenever the set changes.
    Presence {
        /// Online identities, sorted.
        online: Vec<String>,
    },

    /// A directed message delivered to its recipient.
    Message {
        /// Unique identifier assigned at accept time.
        id: MessageId,
        /// Sender identity (authoritative, assigned by the relay).
        from: String,
        /// Content kind.
        kind: MessageKind,
        /// Text body or image URL, depending on `kind`.
        content: String,
        /// Server-assigned send time, the ordering authority.
        sent_at: Timestamp,
        /// Sender's local clock at send time, display only.
        client_sent_at: Timestamp,
    },

    /// A peer started or stopped composing toward the receiving client.
    Typing {
        /// Composing identity.
        from: String,
        /// True while composing, false when stopped.
        is_typing: bool,
    },

    /// The receiving client's messages were read by `reader`.
    Read {
        /// Identity that read the backlog.
        reader: String,
    },

    /// Snapshot of unread counters, in response to [`ClientEvent::PullUnread`].
    Unread {
        /// Per-sender unread counts, sorted by sender identity.
        counts: Vec<(String, u32)>,
    },

    /// The relay reports an error condition.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Error type for event encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ClientEvent`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientEvent`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_client(bytes: &[u8]) -> Result<ClientEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerEvent`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerEvent`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_server(bytes: &[u8]) -> Result<ServerEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
