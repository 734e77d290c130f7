//! Sync service for the block archiver.
//!
//! Keeps an on-disk [`archive::BlockStore`] in step with a live node:
//!
//! - **NodeClient**: Narrow request/response view of the node (hash by height, payload by hash, best hash)
//! - **SyncEngine**: Walks heights from a resume point until the node runs out of blocks
//! - **Trigger sources**: Tell the engine the tip may have moved (interval polling or push subscription)
//! - **Committer**: Snapshots the archive after a cycle reaches a tip (git, optionally pushed)
//! - **SyncService**: Runs one cycle per trigger, strictly one at a time
//!
//! ## Cycle
//!
//! 1. Resume height = highest archived height minus the reorg window (or 0)
//! 2. Fetch hash and payload for each height in turn and reconcile it into the store
//! 3. Stop at the first height the node has not produced yet
//! 4. Hand the last reconciled `(height, hash)` to the committer
//!
//! Re-walking the trailing window each cycle heals shallow reorgs through
//! the store's delete-then-write, so there is no separate reorg detection.
pub mod committer;
pub mod engine;
pub mod node;
pub mod rpc;
pub mod service;
pub mod trigger;

pub use committer::{
    CommitOutcome, Committer, GitCommitter, GitOutput, GitRunner, NoopCommitter,
    ProcessGitRunner, PushTarget,
};
pub use engine::{CommitStatus, CycleReport, SyncEngine, SyncError, SyncPass};
pub use node::{NodeClient, NodeError};
pub use rpc::{BitcoindRpcClient, RpcAuth};
pub use service::{ServiceStats, SyncService};
pub use trigger::{
    Notification, NotificationSource, PollTrigger, SubscriptionTrigger, Trigger, TriggerSource,
    ZmqNotificationSource,
};
