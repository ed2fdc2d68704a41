//! Unread counters for messages that missed live delivery.
//!
//! The ledger tracks, per recipient, how many messages from each sender
//! were accepted while the recipient had no live connection. Counters
//! reset when the recipient acknowledges reading that sender's backlog.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Per-recipient unread counters keyed by sender.
#[derive(Debug, Default)]
pub struct UnreadLedger {
    // recipient -> sender -> count
    counts: RwLock<HashMap<String, HashMap<String, u32>>>,
}

impl UnreadLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more unread message from `sender` to `recipient`,
    /// returning the new count.
    pub async fn increment(&self, recipient: &str, sender: &str) -> u32 {
        let mut counts = self.counts.write().await;
        let entry = counts
            .entry(recipient.to_string())
            .or_default()
            .entry(sender.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }

    /// Clears the counter for `sender`'s messages to `recipient`,
    /// returning how many were cleared.
    pub async fn clear(&self, recipient: &str, sender: &str) -> u32 {
        let mut counts = self.counts.write().await;
        let Some(per_sender) = counts.get_mut(recipient) else {
            return 0;
        };
        let cleared = per_sender.remove(sender).unwrap_or(0);
        if per_sender.is_empty() {
            counts.remove(recipient);
        }
        cleared
    }

    /// Returns the recipient's counters sorted by sender identity.
    /// Senders with no unread messages do not appear.
    pub async fn snapshot(&self, recipient: &str) -> Vec<(String, u32)> {
        let counts = self.counts.read().await;
        let mut entries: Vec<(String, u32)> = counts
            .get(recipient)
            .map(|per_sender| {
                per_sender
                    .iter()
                    .map(|(sender, count)| (sender.clone(), *count))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
