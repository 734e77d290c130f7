use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal position of a block in the chain, starting at 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Height(pub u64);

impl Height {
    pub const GENESIS: Height = Height(0);

    /// The height directly above this one.
    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }

    /// Steps back `depth` blocks, stopping at genesis.
    pub fn saturating_sub(self, depth: u64) -> Height {
        Height(self.0.saturating_sub(depth))
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Height(value)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
