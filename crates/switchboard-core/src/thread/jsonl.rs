//! File-backed thread store with an in-memory cache.
//!
//! File format: JSONL in `~/.switchboard/threads/{safe_id}-{id_hash}.jsonl`
//! - Line 1: `{"_type":"metadata","id":"...","resourceId":"...","pendingRun":null,...}`
//! - Line 2+: `{"role":"user","content":"hello","timestamp":"..."}`

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ConversationStore, ThreadSummary};
use crate::error::Result;
use crate::types::{PendingRunHandle, ResolvedRun, Thread, ThreadMessage};
use crate::utils;

/// Metadata header written as the first line of each thread file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadHeader {
    #[serde(rename = "_type")]
    record_type: String,
    id: String,
    resource_id: String,
    #[serde(default)]
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    pending_run: Option<PendingRunHandle>,
    #[serde(default)]
    resolved_run: Option<ResolvedRun>,
}

impl ThreadHeader {
    fn from_thread(thread: &Thread) -> Self {
        ThreadHeader {
            record_type: "metadata".to_string(),
            id: thread.id.clone(),
            resource_id: thread.resource_id.clone(),
            title: thread.title.clone(),
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            metadata: thread.metadata.clone(),
            pending_run: thread.pending_run.clone(),
            resolved_run: thread.resolved_run.clone(),
        }
    }

    fn into_thread(self, messages: Vec<ThreadMessage>) -> Thread {
        Thread {
            id: self.id,
            resource_id: self.resource_id,
            title: self.title,
            messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
            metadata: self.metadata,
            pending_run: self.pending_run,
            resolved_run: self.resolved_run,
        }
    }
}

/// Conversation store persisting each thread as a JSONL file.
pub struct JsonlThreadStore {
    /// Directory where `.jsonl` thread files are stored.
    threads_dir: PathBuf,
    /// Cache of threads already read or written by this process.
    cache: RwLock<HashMap<String, Thread>>,
}

impl JsonlThreadStore {
    /// Create a store rooted at `threads_dir` (default `~/.switchboard/threads/`).
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(threads_dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = threads_dir.unwrap_or_else(utils::get_threads_path);
        std::fs::create_dir_all(&dir)?;

        Ok(JsonlThreadStore {
            threads_dir: dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the thread files.
    pub fn dir(&self) -> &std::path::Path {
        &self.threads_dir
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.threads_dir.join(format!("{}.jsonl", file_stem(thread_id)))
    }

    fn read_file(&self, thread_id: &str) -> std::io::Result<Option<Thread>> {
        let Some(thread) = read_path(&self.thread_path(thread_id))? else {
            return Ok(None);
        };
        if thread.id != thread_id {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("thread file for '{thread_id}' belongs to '{}'", thread.id),
            ));
        }
        Ok(Some(thread))
    }

    fn write_file(&self, thread: &Thread) -> std::io::Result<()> {
        let path = self.thread_path(&thread.id);
        let tmp = path.with_extension("jsonl.tmp");

        {
            let mut file = std::io::BufWriter::new(std::fs::File::create(&tmp)?);
            writeln!(file, "{}", serde_json::to_string(&ThreadHeader::from_thread(thread))?)?;
            for msg in &thread.messages {
                writeln!(file, "{}", serde_json::to_string(msg)?)?;
            }
            file.flush()?;
        }
        std::fs::rename(&tmp, &path)?;

        debug!(
            thread = %thread.id,
            messages = thread.messages.len(),
            path = %path.display(),
            "saved thread"
        );
        Ok(())
    }
}

/// File name of a thread: readable prefix plus a hash of the full id, so ids
/// that only differ in rewritten characters never share a file.
fn file_stem(thread_id: &str) -> String {
    let digest = Sha256::digest(thread_id.as_bytes());
    format!("{}-{}", utils::safe_filename(thread_id), hex::encode(&digest[..8]))
}

fn read_path(path: &Path) -> std::io::Result<Option<Thread>> {
    if !path.exists() {
        return Ok(None);
    }

    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => serde_json::from_str::<ThreadHeader>(&line?)?,
        None => {
            warn!(path = %path.display(), "thread file is empty");
            return Ok(None);
        }
    };

    let mut messages = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ThreadMessage>(&line) {
            Ok(msg) => messages.push(msg),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed thread line"),
        }
    }

    debug!(thread = %header.id, messages = messages.len(), "loaded thread from disk");
    Ok(Some(header.into_thread(messages)))
}

#[async_trait]
impl ConversationStore for JsonlThreadStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>> {
        if let Some(thread) = self.cache.read().await.get(thread_id) {
            return Ok(Some(thread.clone()));
        }

        let loaded = self.read_file(thread_id)?;
        if let Some(thread) = &loaded {
            self.cache
                .write()
                .await
                .insert(thread_id.to_string(), thread.clone());
        }
        Ok(loaded)
    }

    async fn save(&self, thread: &Thread) -> Result<()> {
        self.write_file(thread)?;
        self.cache
            .write()
            .await
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let mut summaries = Vec::new();

        for entry in std::fs::read_dir(&self.threads_dir)?.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            match read_path(&path) {
                Ok(Some(thread)) => summaries.push(ThreadSummary::from(&thread)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable thread file"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        self.cache.write().await.remove(thread_id);

        let path = self.thread_path(thread_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        debug!(path = %path.display(), "deleted thread file");
        Ok(true)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfirmationKind, ResourceType};
    use crate::NetworkError;
    use serde_json::json;
    use tempfile::tempdir;

    fn make_store() -> (JsonlThreadStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap();
        (store, dir)
    }

    fn handle(run_id: &str) -> PendingRunHandle {
        PendingRunHandle {
            run_id: run_id.into(),
            resource_id: "meeting-invite-workflow".into(),
            resource_type: ResourceType::Workflow,
            payload: json!({"message": "confirm? yes/no"}),
            expects: ConfirmationKind::YesNo,
            task: "invite bob".into(),
            iteration: 1,
            max_iterations: Some(5),
            one_off: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_new_thread() {
        let (store, _dir) = make_store();
        let thread = store.get_or_create("t-1", "orders-network").await.unwrap();
        assert_eq!(thread.id, "t-1");
        assert_eq!(thread.resource_id, "orders-network");
        assert!(thread.messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_history() {
        let (store, _dir) = make_store();
        store.get_or_create("t-1", "net").await.unwrap();
        for i in 0..10 {
            store
                .append("t-1", ThreadMessage::user(format!("msg {i}")))
                .await
                .unwrap();
        }

        let history = store.history("t-1", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "msg 7");
        assert_eq!(store.message_count("t-1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_append_to_missing_thread_fails() {
        let (store, _dir) = make_store();
        let err = store
            .append("ghost", ThreadMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Store(_)));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();

        {
            let store = JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap();
            store.get_or_create("t-42", "net").await.unwrap();
            store.append("t-42", ThreadMessage::user("Hello")).await.unwrap();
            store
                .append(
                    "t-42",
                    ThreadMessage::assistant("Hi!").from_resource("orderAgentSingle"),
                )
                .await
                .unwrap();
            store.set_pending_run("t-42", handle("run-1")).await.unwrap();
        }

        // Fresh store (empty cache) reads from disk
        let store = JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap();
        let thread = store.load("t-42").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].resource.as_deref(), Some("orderAgentSingle"));
        assert_eq!(thread.pending_run.unwrap().run_id, "run-1");
    }

    #[tokio::test]
    async fn test_file_format() {
        let (store, dir) = make_store();
        store.get_or_create("cli:local", "net").await.unwrap();
        store
            .append("cli:local", ThreadMessage::user("test message"))
            .await
            .unwrap();

        let path = store.thread_path("cli:local");
        assert!(path.starts_with(dir.path()));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("cli_local-"));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let meta: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(meta["_type"], "metadata");
        assert_eq!(meta["id"], "cli:local");
        assert!(meta["pendingRun"].is_null());

        let msg: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "test message");
    }

    #[tokio::test]
    async fn test_pending_run_lifecycle() {
        let (store, _dir) = make_store();
        store.get_or_create("t-1", "net").await.unwrap();
        assert!(store.pending_run("t-1").await.unwrap().is_none());

        store.set_pending_run("t-1", handle("run-1")).await.unwrap();
        // A second, different run cannot be parked on the same thread.
        let err = store.set_pending_run("t-1", handle("run-2")).await.unwrap_err();
        assert!(matches!(err, NetworkError::ThreadSuspended { ref run_id, .. } if run_id == "run-1"));

        let taken = store.take_pending_run("t-1").await.unwrap();
        assert_eq!(taken.unwrap().run_id, "run-1");
        assert!(store.take_pending_run("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_threads() {
        let (store, _dir) = make_store();
        for id in ["a", "b", "c"] {
            store.get_or_create(id, "net").await.unwrap();
        }
        store.set_pending_run("b", handle("run-b")).await.unwrap();

        let threads = store.list_threads().await.unwrap();
        assert_eq!(threads.len(), 3);
        assert_eq!(threads[0].id, "b");
        assert!(threads[0].pending);
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let (store, _dir) = make_store();
        store.get_or_create("t-1", "net").await.unwrap();
        assert!(store.delete("t-1").await.unwrap());
        assert!(!store.delete("t-1").await.unwrap());
        assert!(store.load("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_threads_independent() {
        let (store, _dir) = make_store();
        store.get_or_create("a", "net").await.unwrap();
        store.get_or_create("b", "net").await.unwrap();
        store.append("a", ThreadMessage::user("hello a")).await.unwrap();
        store.append("b", ThreadMessage::user("hello b")).await.unwrap();
        store.append("b", ThreadMessage::user("again")).await.unwrap();

        assert_eq!(store.message_count("a").await.unwrap(), 1);
        assert_eq!(store.message_count("b").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ids_with_same_safe_name_stay_apart() {
        let dir = tempdir().unwrap();
        {
            let store = JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap();
            store.get_or_create("user:1", "net").await.unwrap();
            store
                .append("user:1", ThreadMessage::user("secret of user:1"))
                .await
                .unwrap();
            store.set_pending_run("user:1", handle("run-1")).await.unwrap();
        }

        let store = JsonlThreadStore::new(Some(dir.path().to_path_buf())).unwrap();
        let other = store.get_or_create("user_1", "net").await.unwrap();
        assert_eq!(other.id, "user_1");
        assert!(other.messages.is_empty());
        assert!(other.pending_run.is_none());

        let original = store.load("user:1").await.unwrap().unwrap();
        assert_eq!(original.messages[0].content, "secret of user:1");
        assert_eq!(store.list_threads().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_of_another_thread_is_rejected() {
        let (store, _dir) = make_store();
        store.get_or_create("a", "net").await.unwrap();
        std::fs::copy(store.thread_path("a"), store.thread_path("b")).unwrap();

        let err = store.load("b").await.unwrap_err();
        assert!(matches!(err, NetworkError::Store(_)));
    }
}
