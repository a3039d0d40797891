//! Conversation checkpoints keyed by thread.
//!
//! Every store keeps checkpoints in insertion order and lists them newest
//! first, so the first checkpoint seen for a thread is its latest state.

use crate::error::{ModelError, ModelResult};
use crate::graph::ChatState;
use crate::types::ThreadId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Snapshot of one thread's state after a graph step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub thread_id: ThreadId,
    pub step: u32,
    pub created_at: DateTime<Utc>,
    pub state: ChatState,
}

impl Checkpoint {
    pub fn new(thread_id: ThreadId, step: u32, state: ChatState) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id,
            step,
            created_at: Utc::now(),
            state,
        }
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn put(&self, checkpoint: Checkpoint) -> ModelResult<()>;

    /// All checkpoints, newest first, optionally restricted to one thread
    async fn list(&self, thread: Option<&ThreadId>) -> ModelResult<Vec<Checkpoint>>;

    /// Latest checkpoint of a thread
    async fn get(&self, thread: &ThreadId) -> ModelResult<Option<Checkpoint>> {
        Ok(self.list(Some(thread)).await?.into_iter().next())
    }

    /// Distinct thread ids, most recently active first
    async fn list_threads(&self) -> ModelResult<Vec<ThreadId>> {
        Ok(unique_threads(&self.list(None).await?))
    }
}

/// Distinct thread ids in the order they first appear
pub fn unique_threads(checkpoints: &[Checkpoint]) -> Vec<ThreadId> {
    let mut seen = HashSet::new();
    checkpoints
        .iter()
        .filter(|c| seen.insert(c.thread_id.clone()))
        .map(|c| c.thread_id.clone())
        .collect()
}

/// In-process store; contents are lost when it is dropped.
#[derive(Default)]
pub struct MemorySaver {
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(&self, checkpoint: Checkpoint) -> ModelResult<()> {
        self.checkpoints.write().await.push(checkpoint);
        Ok(())
    }

    async fn list(&self, thread: Option<&ThreadId>) -> ModelResult<Vec<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints
            .iter()
            .rev()
            .filter(|c| thread.map_or(true, |t| &c.thread_id == t))
            .cloned()
            .collect())
    }
}

/// Append-only JSON Lines file, one checkpoint per line.
///
/// Reads and appends share one lock, so a listing never sees a half
/// written line from a concurrent `put`.
pub struct FileSaver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSaver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> ModelResult<Vec<Checkpoint>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| {
                    ModelError::Checkpoint(format!("{}:{}: {}", self.path.display(), idx + 1, e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl Checkpointer for FileSaver {
    async fn put(&self, checkpoint: Checkpoint) -> ModelResult<()> {
        let mut line = serde_json::to_string(&checkpoint)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(thread = %checkpoint.thread_id, step = checkpoint.step, "checkpoint written");
        Ok(())
    }

    async fn list(&self, thread: Option<&ThreadId>) -> ModelResult<Vec<Checkpoint>> {
        let mut checkpoints = {
            let _guard = self.lock.lock().await;
            self.read_all().await?
        };
        checkpoints.reverse();
        if let Some(thread) = thread {
            checkpoints.retain(|c| &c.thread_id == thread);
        }
        Ok(checkpoints)
    }
}
