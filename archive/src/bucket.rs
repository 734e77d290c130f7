use chain::{SUB_BUCKET_SPAN, TOP_BUCKET_SPAN};
use containers::{BlockHash, Height};

/// First height of the top-level bucket containing `height`.
pub fn top_bucket(height: Height) -> u64 {
    height.0 / TOP_BUCKET_SPAN * TOP_BUCKET_SPAN
}

/// First height of the sub-bucket containing `height`.
pub fn sub_bucket(height: Height) -> u64 {
    height.0 / SUB_BUCKET_SPAN * SUB_BUCKET_SPAN
}

/// Directory name of a top-level bucket: `0`, `100k`, `200k`, ...
pub fn top_bucket_dir(start: u64) -> String {
    if start == 0 {
        "0".to_string()
    } else {
        format!("{}k", start / 1_000)
    }
}

/// Directory name of a sub-bucket: the literal first height.
pub fn sub_bucket_dir(start: u64) -> String {
    start.to_string()
}

pub fn entry_file_name(height: Height, hash: &BlockHash, extension: &str) -> String {
    format!("{height}_{hash}.{extension}")
}

/// Parses a top-level bucket directory name back to its first height.
///
/// Only canonical names are accepted, so stray directories such as `.git`
/// or `007k` are never mistaken for buckets.
pub fn parse_top_bucket(name: &str) -> Option<u64> {
    let start = if name == "0" {
        0
    } else {
        name.strip_suffix('k')?.parse::<u64>().ok()?.checked_mul(1_000)?
    };

    (start % TOP_BUCKET_SPAN == 0 && top_bucket_dir(start) == name).then_some(start)
}

/// Parses a sub-bucket directory name, requiring it to lie inside `top`.
pub fn parse_sub_bucket(name: &str, top: u64) -> Option<u64> {
    let start = name.parse::<u64>().ok()?;

    let canonical = start % SUB_BUCKET_SPAN == 0 && sub_bucket_dir(start) == name;
    let inside = top_bucket(Height(start)) == top;

    (canonical && inside).then_some(start)
}

/// Parses `<height>_<hash>.<ext>` into its `(height, hash)` identity.
pub fn parse_entry_name(name: &str, extension: &str) -> Option<(Height, BlockHash)> {
    let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
    let (height_str, hash_str) = stem.split_once('_')?;

    let height = height_str.parse::<u64>().ok()?;
    if height.to_string() != height_str {
        return None;
    }

    let hash = hash_str.parse::<BlockHash>().ok()?;
    Some((Height(height), hash))
}
