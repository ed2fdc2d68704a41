//! Message types for the duochat protocol.
//!
//! A directed message has exactly one sender and one recipient identity.
//! The relay persists every message as a [`MessageRecord`] with a
//! server-assigned timestamp; the client-supplied timestamp is carried
//! alongside for display but never used for ordering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message content size in bytes (64 KB).
///
/// Applies to text bodies and to image URLs alike; an upload that produced
/// a URL longer than this is malformed anyway.
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Unique identifier for a persisted message, based on UUID v7 so that ids
/// sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Kind of a directed message's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Plain text; `content` is the text itself.
    Text,
    /// An uploaded image; `content` is a retrievable URL.
    Image,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A persisted directed message.
///
/// `sent_at` is assigned by the relay when the message is accepted and is
/// the authority for ordering; `client_sent_at` is whatever the sender's
/// clock claimed. `read` flips false to true exactly once, when the
/// recipient acknowledges the sender's backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Sending identity.
    pub from: String,
    /// Receiving identity.
    pub to: String,
    /// Content kind.
    pub kind: MessageKind,
    /// Text body or image URL, depending on `kind`.
    pub content: String,
    /// Server-assigned send time.
    pub sent_at: Timestamp,
    /// Client-supplied send time, display only.
    pub client_sent_at: Timestamp,
    /// Whether the recipient has acknowledged reading this message.
    pub read: bool,
}

/// Error returned when message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message content is empty.
    #[error("message content is empty")]
    Empty,
    /// Message content exceeds the maximum allowed size.
    #[error("content too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates directed-message content before it is accepted for delivery.
///
/// `max` is the relay's configured content cap; [`MAX_CONTENT_SIZE`] is the
/// protocol default.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty content, or
/// [`ValidationError::TooLarge`] when it exceeds `max`.
pub const fn validate_content(content: &str, max: usize) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = content.len();
    if size > max {
        return Err(ValidationError::TooLarge { size, max });
    }
    Ok(())
}
