use std::time::Duration;

use async_trait::async_trait;
use containers::BlockHash;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, warn};

use super::{Trigger, TriggerSource};
use crate::node::NodeClient;

/// Polls the node's best block hash and fires when it changes.
///
/// Failed polls are logged and retried on the next tick.
pub struct PollTrigger<N: NodeClient> {
    node: N,
    period: Duration,
    ticker: Option<Interval>,
    last_tip: Option<BlockHash>,
    started: bool,
}

impl<N: NodeClient> PollTrigger<N> {
    pub fn new(node: N, period: Duration) -> Self {
        Self {
            node,
            period,
            ticker: None,
            last_tip: None,
            started: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Best hash seen on the most recent successful poll.
    pub fn last_tip(&self) -> Option<BlockHash> {
        self.last_tip
    }
}

async fn poll_tip<N: NodeClient>(node: &N) -> Option<BlockHash> {
    match node.current_tip_hash().await {
        Ok(hash) => Some(hash),
        Err(err) => {
            warn!(%err, "Failed to poll node tip");
            None
        }
    }
}

#[async_trait]
impl<N: NodeClient> TriggerSource for PollTrigger<N> {
    async fn next_trigger(&mut self) -> Option<Trigger> {
        if !self.started {
            self.started = true;
            self.last_tip = poll_tip(&self.node).await;
            return Some(Trigger::Startup);
        }

        // Created lazily so construction does not need a running runtime.
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            ticker.tick().await;

            let Some(tip) = poll_tip(&self.node).await else {
                continue;
            };

            if self.last_tip != Some(tip) {
                debug!(previous = ?self.last_tip, current = %tip, "Node tip changed");
                self.last_tip = Some(tip);
                return Some(Trigger::TipChanged(tip));
            }
        }
    }
}
