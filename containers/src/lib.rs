pub mod block;
pub mod height;
pub mod types;

pub use block::{Block, Tip};
pub use height::Height;
pub use types::{BlockHash, HASH_LEN};
