use super::{
    model::{NewPoll, PendingPoll, PollId, PollStatus},
    store::{PollStore, StoreError},
};
use alloy::primitives::TxHash;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("a poll is already registered for hash {0}")]
    Duplicate(PollId),
    #[error("no pending poll for {0}")]
    Unknown(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Registers, links and settles pending polls.
///
/// The store is the source of truth for what is still pending; `pending()`
/// is the in-memory view surfaced to the UI and is rebuilt by `rehydrate()`.
pub struct PollTracker {
    store: Arc<dyn PollStore>,
    live: Mutex<BTreeMap<PollId, PendingPoll>>,
    // Serialises read-modify-write sequences against the store.
    write_lock: tokio::sync::Mutex<()>,
}

impl PollTracker {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self {
            store,
            live: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn live(&self) -> MutexGuard<'_, BTreeMap<PollId, PendingPoll>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending(&self) -> Vec<PendingPoll> {
        self.live().values().cloned().collect()
    }

    async fn find(&self, identifier: &str) -> Result<Option<PendingPoll>, PollError> {
        Ok(self
            .store
            .load_all()
            .await?
            .into_iter()
            .find(|poll| poll.matches(identifier)))
    }

    /// Starts tracking a submission under its idempotency hash. A second
    /// registration for the same hash is rejected.
    #[instrument(skip_all, fields(hash = %poll.hash, action = %poll.action))]
    pub async fn register(&self, poll: NewPoll) -> Result<PollId, PollError> {
        let _guard = self.write_lock.lock().await;
        let pending = poll.into_pending();
        let id = pending.id.clone();

        if !self.store.insert_if_absent(pending.clone()).await? {
            warn!("Rejected duplicate poll registration");
            return Err(PollError::Duplicate(id));
        }

        self.live().insert(id.clone(), pending);
        info!("Poll registered");
        Ok(id)
    }

    #[instrument(skip(self, tx_hash), fields(tx_hash = %tx_hash))]
    pub async fn attach_tx_hash(&self, poll_id: &str, tx_hash: TxHash) -> Result<PendingPoll, PollError> {
        let _guard = self.write_lock.lock().await;
        let mut poll = self
            .store
            .load_all()
            .await?
            .into_iter()
            .find(|poll| poll.id == poll_id)
            .ok_or_else(|| PollError::Unknown(poll_id.to_string()))?;

        poll.tx_hash = Some(tx_hash);
        self.store.put(poll.clone()).await?;
        self.live().insert(poll.id.clone(), poll.clone());

        info!("Transaction hash attached to poll");
        Ok(poll)
    }

    /// Settles the matching poll. Unknown or already settled identifiers are
    /// a no-op and return `None`.
    pub async fn resolve(&self, identifier: &str) -> Result<Option<PendingPoll>, PollError> {
        self.finish(identifier, PollStatus::Resolved).await
    }

    pub async fn fail(&self, identifier: &str) -> Result<Option<PendingPoll>, PollError> {
        self.finish(identifier, PollStatus::Errored).await
    }

    /// Stops tracking locally. The chain action itself is unaffected.
    pub async fn abandon(&self, identifier: &str) -> Result<Option<PendingPoll>, PollError> {
        self.finish(identifier, PollStatus::Abandoned).await
    }

    #[instrument(skip(self))]
    async fn finish(&self, identifier: &str, status: PollStatus) -> Result<Option<PendingPoll>, PollError> {
        let _guard = self.write_lock.lock().await;

        let Some(mut poll) = self.find(identifier).await? else {
            self.live().retain(|_, poll| !poll.matches(identifier));
            debug!("Poll already settled or never registered");
            return Ok(None);
        };

        self.store.remove(&poll.id).await?;
        self.live().remove(&poll.id);
        poll.status = status;

        info!(poll_id = %poll.id, action = %poll.action, ?status, "Poll settled");
        Ok(Some(poll))
    }

    /// Rebuilds the in-memory view from the store and returns everything
    /// still pending.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<Vec<PendingPoll>, PollError> {
        let _guard = self.write_lock.lock().await;
        let polls = self.store.load_all().await?;

        let mut live = self.live();
        live.clear();
        for poll in &polls {
            info!(
                poll_id = %poll.id,
                action = %poll.action,
                tx_hash = ?poll.tx_hash,
                "Rehydrated pending poll"
            );
            live.insert(poll.id.clone(), poll.clone());
        }

        Ok(polls)
    }

    /// Abandons every poll created more than `max_age_secs` before `now`.
    pub async fn sweep_stale(&self, max_age_secs: i64, now: i64) -> Result<Vec<PendingPoll>, PollError> {
        let stale: Vec<PollId> = self
            .store
            .load_all()
            .await?
            .into_iter()
            .filter(|poll| poll.age_secs(now) > max_age_secs)
            .map(|poll| poll.id)
            .collect();

        let mut abandoned = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(poll) = self.abandon(&id).await? {
                warn!(poll_id = %poll.id, action = %poll.action, "Abandoned stale poll");
                abandoned.push(poll);
            }
        }
        Ok(abandoned)
    }
}
