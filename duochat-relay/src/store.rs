//! Message persistence behind the delivery path.
//!
//! Every accepted directed message is appended here before any forwarding
//! decision is made; a failed append means the message was not sent.
//! Read receipts flip the `read` flag on the stored rows, so per-sender
//! unread state stays derivable from the store alone.

use duochat_proto::message::MessageRecord;
use tokio::sync::Mutex;

/// Errors from message persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Trait for persisting directed messages and their read state.
///
/// The relay is generic over this seam; tests substitute failing
/// implementations to exercise the persistence-failure paths.
pub trait MessageStore: Send + Sync {
    /// Persist an accepted message.
    fn append(
        &self,
        record: &MessageRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Mark every message from `author` to `reader` as read, returning how
    /// many rows were flipped.
    fn mark_read(
        &self,
        author: &str,
        reader: &str,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Retrieve the conversation between two identities, oldest first.
    ///
    /// Returns at most `limit` messages, keeping the most recent ones.
    fn conversation(
        &self,
        a: &str,
        b: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRecord>, StoreError>> + Send;
}

/// In-memory implementation of [`MessageStore`].
///
/// Rows live in append order in a `Vec`; all data is lost when the
/// process exits.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<MessageRecord>>,
}

impl InMemoryMessageStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    async fn append(&self, record: &MessageRecord) -> Result<(), StoreError> {
        self.messages.lock().await.push(record.clone());
        Ok(())
    }

    async fn mark_read(&self, author: &str, reader: &str) -> Result<usize, StoreError> {
        let mut messages = self.messages.lock().await;
        let mut flipped = 0;
        for record in messages.iter_mut() {
            if record.from == author && record.to == reader && !record.read {
                record.read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn conversation(
        &self,
        a: &str,
        b: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let messages = self.messages.lock().await;
        let mut results: Vec<MessageRecord> = messages
            .iter()
            .filter(|r| {
                (r.from == a && r.to == b) || (r.from == b && r.to == a)
            })
            .cloned()
            .collect();

        // Oldest first; ids are time-ordered and break sent_at ties.
        results.sort_by(|x, y| (x.sent_at, x.id.as_uuid()).cmp(&(y.sent_at, y.id.as_uuid())));
        if results.len() > limit {
            results.drain(..results.len() - limit);
        }
        Ok(results)
    }
}
