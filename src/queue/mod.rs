pub mod worker;

pub use worker::run_queue_worker;

use crate::model::LogMessage;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A message that exhausted its in-line retries and awaits reroute to a
/// sink it has not tried yet.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: LogMessage,

    /// Sinks that have already failed for this message. Grows
    /// monotonically; entries are never removed.
    pub tried_sinks: HashSet<String>,

    /// Queue-level attempt counter, distinct from the in-line retry count.
    pub attempts: u32,

    pub last_attempt: DateTime<Utc>,

    /// Set once at enqueue time and never touched afterwards.
    pub queued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(message: LogMessage, exhausted_sink: String) -> Self {
        let now = Utc::now();
        Self {
            message,
            tried_sinks: HashSet::from([exhausted_sink]),
            attempts: 0,
            last_attempt: now,
            queued_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub len: usize,
    /// `queued_at` of the front (oldest) entry.
    pub oldest: Option<DateTime<Utc>>,
}

/// In-memory buffer of messages awaiting reroute. All access goes through
/// one async mutex; the worker holds it for a full cycle, so writers (the
/// dispatcher) and readers (the /queue endpoint) block until the pass ends.
pub struct RetryQueue {
    entries: Mutex<Vec<QueuedMessage>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, entry: QueuedMessage) {
        let mut entries = self.entries.lock().await;
        entries.push(entry);
        debug!(queue_size = entries.len(), "Log message enqueued for reroute");
    }

    pub async fn stats(&self) -> QueueStats {
        let entries = self.entries.lock().await;
        QueueStats {
            len: entries.len(),
            oldest: entries.first().map(|e| e.queued_at),
        }
    }

    /// Exclusive access for the worker's per-cycle pass.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Vec<QueuedMessage>> {
        self.entries.lock().await
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}
