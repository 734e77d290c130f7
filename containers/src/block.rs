use crate::{BlockHash, Height};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block as fetched from the node.
///
/// Identity is the `(height, hash)` pair: after a reorg the same height can
/// come back with a different hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub height: Height,
    pub hash: BlockHash,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(height: Height, hash: BlockHash, payload: Vec<u8>) -> Self {
        Self {
            height,
            hash,
            payload,
        }
    }

    pub fn tip(&self) -> Tip {
        Tip {
            height: self.height,
            hash: self.hash,
        }
    }
}

/// Highest `(height, hash)` reached by a sync pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tip {
    pub height: Height,
    pub hash: BlockHash,
}

impl Tip {
    pub fn new(height: Height, hash: BlockHash) -> Self {
        Self { height, hash }
    }
}

impl fmt::Display for Tip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.height, self.hash)
    }
}
