pub mod server;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    tip_height: IntGauge,
    sync_cycles: IntCounterVec,
    sync_cycle_duration: Histogram,
    blocks_written: IntCounter,
    blocks_unchanged: IntCounter,
    reorged_entries: IntCounter,
    commits: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tip_height = IntGauge::with_opts(Opts::new("archiver_tip_height", "Highest block height reached by the last sync cycle")).unwrap();
        registry.register(Box::new(tip_height.clone())).unwrap();

        // Sync
        let sync_cycles = IntCounterVec::new(
            Opts::new("archiver_sync_cycles_total", "Total number of sync cycles by result"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(sync_cycles.clone())).unwrap();

        let sync_cycle_duration = Histogram::with_opts(
            HistogramOpts::new("archiver_sync_cycle_duration_seconds", "Time taken by one sync cycle")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        ).unwrap();
        registry.register(Box::new(sync_cycle_duration.clone())).unwrap();

        // Archive
        let blocks_written = IntCounter::with_opts(Opts::new("archiver_blocks_written_total", "Total number of block files written")).unwrap();
        registry.register(Box::new(blocks_written.clone())).unwrap();

        let blocks_unchanged = IntCounter::with_opts(Opts::new("archiver_blocks_unchanged_total", "Total number of re-walked blocks already archived")).unwrap();
        registry.register(Box::new(blocks_unchanged.clone())).unwrap();

        let reorged_entries = IntCounter::with_opts(Opts::new("archiver_reorged_entries_total", "Total number of block files removed after a reorg")).unwrap();
        registry.register(Box::new(reorged_entries.clone())).unwrap();

        // Commit
        let commits = IntCounterVec::new(
            Opts::new("archiver_commits_total", "Total number of archive commits by result"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(commits.clone())).unwrap();

        Self {
            registry,
            tip_height,
            sync_cycles,
            sync_cycle_duration,
            blocks_written,
            blocks_unchanged,
            reorged_entries,
            commits,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_tip_height(&self, v: i64) {
        self.tip_height.set(v);
    }

    // Sync
    pub fn inc_sync_cycles(&self, result: &str) {
        self.sync_cycles.with_label_values(&[result]).inc();
    }

    pub fn observe_cycle_duration(&self, duration: f64) {
        self.sync_cycle_duration.observe(duration);
    }

    // Archive
    pub fn inc_blocks_written(&self, n: u64) {
        self.blocks_written.inc_by(n);
    }

    pub fn inc_blocks_unchanged(&self, n: u64) {
        self.blocks_unchanged.inc_by(n);
    }

    pub fn inc_reorged_entries(&self, n: u64) {
        self.reorged_entries.inc_by(n);
    }

    // Commit
    pub fn inc_commits(&self, result: &str) {
        self.commits.with_label_values(&[result]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_exposes_archiver_metrics() {
        let metrics = Metrics::new();
        metrics.set_tip_height(840_000);
        metrics.inc_sync_cycles("ok");
        metrics.inc_blocks_written(12);
        metrics.inc_reorged_entries(2);
        metrics.inc_commits("skipped");
        metrics.observe_cycle_duration(0.25);

        let text = metrics.gather();
        assert!(text.contains("archiver_tip_height 840000"));
        assert!(text.contains("archiver_sync_cycles_total{result=\"ok\"} 1"));
        assert!(text.contains("archiver_blocks_written_total 12"));
        assert!(text.contains("archiver_reorged_entries_total 2"));
        assert!(text.contains("archiver_commits_total{result=\"skipped\"} 1"));
        assert!(text.contains("archiver_sync_cycle_duration_seconds_count 1"));
    }
}
