use super::model::{PendingPoll, PollId};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read poll cache: {0}")]
    Read(std::io::Error),
    #[error("Failed to write poll cache: {0}")]
    Write(std::io::Error),
    #[error("Failed to parse poll cache: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Durable key-value storage of pending polls, keyed by idempotency hash.
/// Holds only entries that are still being waited on.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<PendingPoll>, StoreError>;

    /// Returns `false` and leaves the store untouched when the id is taken.
    async fn insert_if_absent(&self, poll: PendingPoll) -> Result<bool, StoreError>;

    /// Replaces the entry under `poll.id`.
    async fn put(&self, poll: PendingPoll) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<Option<PendingPoll>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryPollStore {
    polls: Mutex<BTreeMap<PollId, PendingPoll>>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_polls(polls: impl IntoIterator<Item = PendingPoll>) -> Self {
        Self {
            polls: Mutex::new(polls.into_iter().map(|poll| (poll.id.clone(), poll)).collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PollId, PendingPoll>> {
        self.polls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn load_all(&self) -> Result<Vec<PendingPoll>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn insert_if_absent(&self, poll: PendingPoll) -> Result<bool, StoreError> {
        let mut polls = self.lock();
        if polls.contains_key(&poll.id) {
            return Ok(false);
        }
        polls.insert(poll.id.clone(), poll);
        Ok(true)
    }

    async fn put(&self, poll: PendingPoll) -> Result<(), StoreError> {
        self.lock().insert(poll.id.clone(), poll);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<Option<PendingPoll>, StoreError> {
        Ok(self.lock().remove(id))
    }
}

/// A JSON file holding the whole map. Every write replaces the file through a
/// temporary sibling so a crash never leaves a half-written cache.
#[derive(Debug)]
pub struct FilePollStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FilePollStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<BTreeMap<PollId, PendingPoll>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    async fn write(&self, polls: &BTreeMap<PollId, PendingPoll>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::Write)?;
        }

        let contents = serde_json::to_vec_pretty(polls)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(StoreError::Write)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(StoreError::Write)?;

        debug!(path = %self.path.display(), entries = polls.len(), "Poll cache written");
        Ok(())
    }
}

#[async_trait]
impl PollStore for FilePollStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_all(&self) -> Result<Vec<PendingPoll>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.into_values().collect())
    }

    async fn insert_if_absent(&self, poll: PendingPoll) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut polls = self.read().await?;
        if polls.contains_key(&poll.id) {
            return Ok(false);
        }
        polls.insert(poll.id.clone(), poll);
        self.write(&polls).await?;
        Ok(true)
    }

    async fn put(&self, poll: PendingPoll) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut polls = self.read().await?;
        polls.insert(poll.id.clone(), poll);
        self.write(&polls).await
    }

    async fn remove(&self, id: &str) -> Result<Option<PendingPoll>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut polls = self.read().await?;
        let removed = polls.remove(id);
        if removed.is_some() {
            self.write(&polls).await?;
        }
        Ok(removed)
    }
}
