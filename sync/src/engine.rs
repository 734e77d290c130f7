use archive::{BlockStore, ReconcileOutcome, StoreError};
use chain::REORG_WINDOW;
use containers::{Block, Height, Tip};
use tracing::{debug, info, warn};

use crate::committer::{CommitOutcome, Committer};
use crate::node::{NodeClient, NodeError};

/// Failures that abort the current cycle.
///
/// The engine never retries inside a cycle; the next trigger re-runs the
/// whole reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a single pass over the node's heights did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPass {
    /// Last `(height, hash)` reconciled, `None` if the node had nothing at the start height.
    pub tip: Option<Tip>,
    pub written: u64,
    pub unchanged: u64,
    /// Files removed because their height came back with a different hash.
    pub superseded: u64,
}

impl SyncPass {
    pub fn reached(&self) -> Option<Tip> {
        self.tip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// The pass reached no tip, so nothing was handed to the committer.
    NotAttempted,
    Done(CommitOutcome),
    /// The committer failed. Logged only; the archive on disk is still valid.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub start: Height,
    pub pass: SyncPass,
    pub commit: CommitStatus,
}

/// Reconciles the archive against the node.
pub struct SyncEngine<N: NodeClient, C: Committer> {
    node: N,
    store: BlockStore,
    committer: C,
    reorg_window: u64,
}

impl<N: NodeClient, C: Committer> SyncEngine<N, C> {
    pub fn new(node: N, store: BlockStore, committer: C) -> Self {
        Self {
            node,
            store,
            committer,
            reorg_window: REORG_WINDOW,
        }
    }

    pub fn with_reorg_window(mut self, reorg_window: u64) -> Self {
        self.reorg_window = reorg_window;
        self
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn reorg_window(&self) -> u64 {
        self.reorg_window
    }

    /// Height the next pass starts from.
    ///
    /// `max(0, highest archived height - reorg window)`, with an empty
    /// archive resuming from genesis.
    pub fn resume_height(&self) -> Result<Height, SyncError> {
        let resume = self
            .store
            .highest_stored_height()?
            .map_or(Height::GENESIS, |highest| {
                highest.saturating_sub(self.reorg_window)
            });
        Ok(resume)
    }

    /// Fetches and reconciles heights `start, start + 1, ...` one round-trip
    /// at a time until the node reports a height it has not produced.
    ///
    /// Any other node or store failure aborts the pass. Heights are never
    /// fetched in parallel.
    pub async fn sync_from(&self, start: Height) -> Result<SyncPass, SyncError> {
        let mut pass = SyncPass::default();
        let mut height = start;

        loop {
            let Some(hash) = self.node.block_hash_at(height).await? else {
                debug!(height = height.0, "Reached end of node range");
                return Ok(pass);
            };

            let block = Block::new(height, hash, self.node.block_payload(&hash).await?);

            let outcome = self
                .store
                .reconcile(block.height, &block.hash, &block.payload)?;

            if outcome.is_reorg() {
                warn!(
                    height = height.0,
                    hash = %hash,
                    superseded = outcome.superseded().len(),
                    "Reorg detected, replaced archived block"
                );
            }
            pass.superseded += outcome.superseded().len() as u64;

            match outcome {
                ReconcileOutcome::Stored { .. } => pass.written += 1,
                ReconcileOutcome::Unchanged | ReconcileOutcome::Pruned { .. } => {
                    pass.unchanged += 1
                }
            }

            pass.tip = Some(block.tip());
            height = height.next();
        }
    }

    /// One full reconciliation: resume point, sync pass, then commit.
    ///
    /// Commit failures are logged and reported in the [`CycleReport`], never
    /// returned as errors.
    pub async fn perform_cycle(&self) -> Result<CycleReport, SyncError> {
        let start = self.resume_height()?;
        debug!(start = start.0, "Starting sync cycle");

        let pass = self.sync_from(start).await?;

        let commit = match pass.reached() {
            None => {
                info!(start = start.0, "Nothing new to archive");
                CommitStatus::NotAttempted
            }
            Some(tip) => {
                info!(
                    tip = %tip,
                    written = pass.written,
                    unchanged = pass.unchanged,
                    superseded = pass.superseded,
                    "Sync cycle reached tip"
                );

                match self.committer.commit(&tip).await {
                    Ok(outcome) => CommitStatus::Done(outcome),
                    Err(err) => {
                        warn!(tip = %tip, "Failed to commit archive: {err:#}");
                        CommitStatus::Failed
                    }
                }
            }
        };

        Ok(CycleReport {
            start,
            pass,
            commit,
        })
    }
}
