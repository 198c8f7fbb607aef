//! Tracking of submitted-but-unconfirmed transactions.

pub mod model;
pub mod store;
pub mod tracker;

pub use model::{NewPoll, PendingPoll, PollId, PollStatus};
pub use store::{FilePollStore, MemoryPollStore, PollStore, StoreError};
pub use tracker::{PollError, PollTracker};
