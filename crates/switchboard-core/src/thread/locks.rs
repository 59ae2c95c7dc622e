//! Per-thread write serialization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Hands out one async mutex per thread id.
///
/// Holding the guard makes the caller the only writer of that thread;
/// different threads never contend.
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the thread is free and lock it.
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(thread_id).await;
        debug!(thread = thread_id, "waiting for thread lock");
        lock.lock_owned().await
    }

    /// Lock the thread only if nobody holds it.
    pub async fn try_acquire(&self, thread_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(thread_id).await.try_lock_owned().ok()
    }

    /// Thread ids with a live entry.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// The mutex of `thread_id`, dropping entries nobody holds or waits on.
    ///
    /// Holders and waiters each keep a clone of the `Arc`, so a count of one
    /// means only the map refers to it.
    async fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|id, lock| id == thread_id || Arc::strong_count(lock) > 1);
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
