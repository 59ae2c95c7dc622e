//! Conversation store: per-thread message logs plus resume metadata.
//!
//! Backends implement four primitives (`load`, `save`, `list_threads`,
//! `delete`); everything the network needs is built on top of them as
//! provided methods. Callers serialize writes to one thread with
//! [`ThreadLocks`].
//!
//! # Disk format (JSONL)
//!
//! Each thread is a `.jsonl` file under `~/.switchboard/threads/`.
//! - Line 1: metadata `{"_type": "metadata", "id": "...", "pendingRun": {...}, ...}`
//! - Lines 2+: messages `{"role": "user", "content": "hello", "timestamp": "..."}`

pub mod jsonl;
pub mod locks;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{PendingRunHandle, ResolvedRun, Thread, ThreadMessage};

pub use jsonl::JsonlThreadStore;
pub use locks::ThreadLocks;
pub use memory::InMemoryThreadStore;

/// Listing entry for a stored thread.
#[derive(Clone, Debug)]
pub struct ThreadSummary {
    pub id: String,
    pub resource_id: String,
    pub message_count: usize,
    /// Whether a suspended run waits on this thread.
    pub pending: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Thread> for ThreadSummary {
    fn from(thread: &Thread) -> Self {
        ThreadSummary {
            id: thread.id.clone(),
            resource_id: thread.resource_id.clone(),
            message_count: thread.messages.len(),
            pending: thread.pending_run.is_some(),
            updated_at: thread.updated_at,
        }
    }
}

fn missing(thread_id: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("thread '{thread_id}' does not exist"),
    )
}

/// Thread persistence backend.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a thread, `None` if it was never created.
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// Persist a thread, replacing any previous version.
    async fn save(&self, thread: &Thread) -> Result<()>;

    /// All stored threads, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>>;

    /// Remove a thread. Returns whether it existed.
    async fn delete(&self, thread_id: &str) -> Result<bool>;

    /// Get a thread, creating an empty one owned by `resource_id` if missing.
    async fn get_or_create(&self, thread_id: &str, resource_id: &str) -> Result<Thread> {
        if let Some(thread) = self.load(thread_id).await? {
            return Ok(thread);
        }
        let thread = Thread::new(thread_id, resource_id);
        self.save(&thread).await?;
        Ok(thread)
    }

    /// Append one message to an existing thread.
    async fn append(&self, thread_id: &str, message: ThreadMessage) -> Result<()> {
        let mut thread = self.load(thread_id).await?.ok_or_else(|| missing(thread_id))?;
        thread.messages.push(message);
        thread.updated_at = Utc::now();
        self.save(&thread).await
    }

    /// The last `max` messages of a thread, oldest first. Empty if missing.
    async fn history(&self, thread_id: &str, max: usize) -> Result<Vec<ThreadMessage>> {
        Ok(self
            .load(thread_id)
            .await?
            .map(|t| t.tail(max).to_vec())
            .unwrap_or_default())
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize> {
        Ok(self
            .load(thread_id)
            .await?
            .map_or(0, |t| t.messages.len()))
    }

    async fn pending_run(&self, thread_id: &str) -> Result<Option<PendingRunHandle>> {
        Ok(self.load(thread_id).await?.and_then(|t| t.pending_run))
    }

    /// Record the suspended run for a thread.
    ///
    /// Fails if a different run is already pending; re-recording the same run
    /// id replaces its payload.
    async fn set_pending_run(&self, thread_id: &str, handle: PendingRunHandle) -> Result<()> {
        let mut thread = self.load(thread_id).await?.ok_or_else(|| missing(thread_id))?;
        if let Some(existing) = &thread.pending_run {
            if existing.run_id != handle.run_id {
                return Err(crate::error::NetworkError::ThreadSuspended {
                    thread_id: thread_id.to_string(),
                    run_id: existing.run_id.clone(),
                });
            }
        }
        thread.pending_run = Some(handle);
        thread.updated_at = Utc::now();
        self.save(&thread).await
    }

    /// Read and clear the pending handle in one step.
    async fn take_pending_run(&self, thread_id: &str) -> Result<Option<PendingRunHandle>> {
        let Some(mut thread) = self.load(thread_id).await? else {
            return Ok(None);
        };
        let handle = thread.pending_run.take();
        if handle.is_some() {
            thread.updated_at = Utc::now();
            self.save(&thread).await?;
        }
        Ok(handle)
    }

    async fn resolved_run(&self, thread_id: &str) -> Result<Option<ResolvedRun>> {
        Ok(self.load(thread_id).await?.and_then(|t| t.resolved_run))
    }

    /// Replace (or clear) the record of the last completed resume.
    async fn set_resolved_run(&self, thread_id: &str, resolved: Option<ResolvedRun>) -> Result<()> {
        let mut thread = self.load(thread_id).await?.ok_or_else(|| missing(thread_id))?;
        if thread.resolved_run.is_none() && resolved.is_none() {
            return Ok(());
        }
        thread.resolved_run = resolved;
        thread.updated_at = Utc::now();
        self.save(&thread).await
    }
}
