use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use containers::{BlockHash, Height, Tip};
use sync::{CommitOutcome, Committer, NodeClient, NodeError};

/// Node whose chain can be swapped out between cycles to simulate reorgs.
#[derive(Default)]
pub struct ScriptedNode {
    chain: Mutex<Vec<BlockHash>>,
}

impl ScriptedNode {
    pub fn new(chain: Vec<BlockHash>) -> Self {
        Self {
            chain: Mutex::new(chain),
        }
    }

    pub fn replace_from(&self, height: u64, hashes: Vec<BlockHash>) {
        let mut chain = self.chain.lock().unwrap();
        chain.truncate(height as usize);
        chain.extend(hashes);
    }
}

pub fn payload(hash: &BlockHash) -> Vec<u8> {
    hash.as_bytes().repeat(2)
}

#[async_trait]
impl NodeClient for ScriptedNode {
    async fn block_hash_at(&self, height: Height) -> Result<Option<BlockHash>, NodeError> {
        Ok(self.chain.lock().unwrap().get(height.0 as usize).copied())
    }

    async fn block_payload(&self, hash: &BlockHash) -> Result<Vec<u8>, NodeError> {
        Ok(payload(hash))
    }

    async fn current_tip_hash(&self) -> Result<BlockHash, NodeError> {
        self.chain
            .lock()
            .unwrap()
            .last()
            .copied()
            .ok_or_else(|| NodeError::Malformed("no blocks".to_string()))
    }
}

#[derive(Default)]
pub struct TipLog {
    tips: Mutex<Vec<Tip>>,
}

impl TipLog {
    pub fn tips(&self) -> Vec<Tip> {
        self.tips.lock().unwrap().clone()
    }
}

#[async_trait]
impl Committer for TipLog {
    async fn commit(&self, tip: &Tip) -> Result<CommitOutcome> {
        self.tips.lock().unwrap().push(*tip);
        Ok(CommitOutcome::Committed { pushed: false })
    }
}
