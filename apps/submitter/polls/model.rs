use alloy::primitives::TxHash;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The idempotency hash allocated before the transaction hash exists.
pub type PollId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollStatus {
    Pending,
    Resolved,
    Errored,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPoll {
    pub id: PollId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub action: String,
    pub dao_id: String,
    pub chain_id: u64,
    pub created_at: i64,
    pub status: PollStatus,
    /// Values the follow-up handlers need, e.g. the proposal being executed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub local_values: BTreeMap<String, String>,
}

impl PendingPoll {
    /// Matches the idempotency hash or, once attached, the transaction hash.
    pub fn matches(&self, identifier: &str) -> bool {
        if self.id == identifier {
            return true;
        }
        match (self.tx_hash, identifier.parse::<TxHash>()) {
            (Some(tx_hash), Ok(candidate)) => tx_hash == candidate,
            _ => false,
        }
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

/// What a caller knows when it starts tracking a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub hash: PollId,
    pub action: String,
    pub dao_id: String,
    pub chain_id: u64,
    pub local_values: BTreeMap<String, String>,
}

impl NewPoll {
    pub fn into_pending(self) -> PendingPoll {
        PendingPoll {
            id: self.hash,
            tx_hash: None,
            action: self.action,
            dao_id: self.dao_id,
            chain_id: self.chain_id,
            created_at: Utc::now().timestamp(),
            status: PollStatus::Pending,
            local_values: self.local_values,
        }
    }
}
