//! Volatile thread store for tests and one-shot runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConversationStore, ThreadSummary};
use crate::error::Result;
use crate::types::Thread;

/// Keeps every thread in a map; nothing survives the process.
#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, Thread>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread: &Thread) -> Result<()> {
        self.threads
            .write()
            .await
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let mut summaries: Vec<ThreadSummary> = self
            .threads
            .read()
            .await
            .values()
            .map(ThreadSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        Ok(self.threads.write().await.remove(thread_id).is_some())
    }
}
