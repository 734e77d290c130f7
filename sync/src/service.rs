use std::future::Future;
use std::time::Instant;

use containers::Tip;
use metrics::SharedMetrics;
use tokio::select;
use tracing::{debug, info, warn};

use crate::committer::{CommitOutcome, Committer};
use crate::engine::{CommitStatus, CycleReport, SyncEngine};
use crate::node::NodeClient;
use crate::trigger::{Trigger, TriggerSource};

/// Runs one sync cycle per trigger, strictly one at a time.
///
/// Triggers are only pulled between cycles, so anything that fires while a
/// cycle is running waits in the trigger transport.
pub struct SyncService<N: NodeClient, C: Committer, T: TriggerSource> {
    engine: SyncEngine<N, C>,
    triggers: T,
    metrics: Option<SharedMetrics>,
    stats: ServiceStats,
}

impl<N: NodeClient, C: Committer, T: TriggerSource> SyncService<N, C, T> {
    pub fn new(engine: SyncEngine<N, C>, triggers: T) -> Self {
        Self {
            engine,
            triggers,
            metrics: None,
            stats: ServiceStats::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Option<SharedMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn engine(&self) -> &SyncEngine<N, C> {
        &self.engine
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats
    }

    /// Runs until the trigger source is exhausted.
    pub async fn run(&mut self) -> ServiceStats {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs until the trigger source is exhausted or `shutdown` resolves.
    ///
    /// Shutdown is only observed while waiting for a trigger; a cycle that
    /// has started always runs to completion.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) -> ServiceStats {
        tokio::pin!(shutdown);

        loop {
            let trigger = select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping sync service");
                    break;
                }
                trigger = self.triggers.next_trigger() => trigger,
            };

            let Some(trigger) = trigger else {
                info!("Trigger source closed, stopping sync service");
                break;
            };

            self.handle_trigger(trigger).await;
        }

        self.stats
    }

    /// Runs a single cycle for `trigger`. Cycle failures are logged and
    /// counted; the next trigger retries from scratch.
    pub async fn handle_trigger(&mut self, trigger: Trigger) -> Option<CycleReport> {
        debug!(?trigger, "Sync triggered");
        let started = Instant::now();

        let result = self.engine.perform_cycle().await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                self.stats.cycles_completed += 1;
                if let Some(tip) = report.pass.reached() {
                    self.stats.last_tip = Some(tip);
                }
                self.record(&report, elapsed);
                Some(report)
            }
            Err(err) => {
                self.stats.cycles_failed += 1;
                warn!(%err, "Sync cycle failed, waiting for next trigger");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_sync_cycles("failed");
                    metrics.observe_cycle_duration(elapsed);
                }
                None
            }
        }
    }

    fn record(&self, report: &CycleReport, elapsed: f64) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        metrics.observe_cycle_duration(elapsed);
        metrics.inc_blocks_written(report.pass.written);
        metrics.inc_blocks_unchanged(report.pass.unchanged);
        metrics.inc_reorged_entries(report.pass.superseded);

        match report.pass.reached() {
            Some(tip) => {
                metrics.inc_sync_cycles("ok");
                metrics.set_tip_height(tip.height.0 as i64);
            }
            None => metrics.inc_sync_cycles("nothing_new"),
        }

        match report.commit {
            CommitStatus::NotAttempted => {}
            CommitStatus::Done(CommitOutcome::Committed { .. }) => metrics.inc_commits("ok"),
            CommitStatus::Done(_) => metrics.inc_commits("skipped"),
            CommitStatus::Failed => metrics.inc_commits("failed"),
        }
    }
}

/// Counters about the sync service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_tip: Option<Tip>,
}
