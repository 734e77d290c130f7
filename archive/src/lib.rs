//! On-disk block archive.
//!
//! Blocks are stored one file per height under a two-level bucket
//! hierarchy derived purely from the height:
//!
//! ```text
//! <root>/<top-bucket>/<sub-bucket>/<height>_<hash>.<ext>
//! ```
//!
//! - **top-bucket**: `floor(height / 100000) * 100000`, written `0` or `<N>k`
//! - **sub-bucket**: `floor(height / 1000) * 1000`, written as the literal height
//!
//! The store keeps at most one file per height. When a different hash shows
//! up for a stored height, the old file is removed before the new one is
//! written (see [`BlockStore::reconcile`]).

pub mod bucket;
pub mod error;
pub mod store;

pub use bucket::{
    entry_file_name, parse_entry_name, parse_sub_bucket, parse_top_bucket, sub_bucket,
    sub_bucket_dir, top_bucket, top_bucket_dir,
};
pub use error::StoreError;
pub use store::{BlockStore, ReconcileOutcome};
