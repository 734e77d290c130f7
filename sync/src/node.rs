use std::sync::Arc;

use async_trait::async_trait;
use containers::{BlockHash, Height};

/// Failures talking to the node.
///
/// A height the node has not produced yet is not an error; see
/// [`NodeClient::block_hash_at`].
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned http status {status}")]
    Http { status: u16 },

    #[error("node rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed node response: {0}")]
    Malformed(String),

    #[error("block payload is not valid hex: {0}")]
    Decode(#[from] hex::FromHexError),
}

/// Node access used by the sync engine and the poll trigger.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Hash of the block at `height`, or `None` when the node has not
    /// produced that height yet.
    async fn block_hash_at(&self, height: Height) -> Result<Option<BlockHash>, NodeError>;

    /// Raw serialized block for `hash`.
    async fn block_payload(&self, hash: &BlockHash) -> Result<Vec<u8>, NodeError>;

    /// Hash of the node's current best block.
    async fn current_tip_hash(&self) -> Result<BlockHash, NodeError>;
}

#[async_trait]
impl<T: NodeClient + ?Sized> NodeClient for Arc<T> {
    async fn block_hash_at(&self, height: Height) -> Result<Option<BlockHash>, NodeError> {
        (**self).block_hash_at(height).await
    }

    async fn block_payload(&self, hash: &BlockHash) -> Result<Vec<u8>, NodeError> {
        (**self).block_payload(hash).await
    }

    async fn current_tip_hash(&self) -> Result<BlockHash, NodeError> {
        (**self).current_tip_hash().await
    }
}
