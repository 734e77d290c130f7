use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chain::DEFAULT_BLOCK_EXTENSION;
use containers::{BlockHash, Height};
use tracing::{debug, warn};

use crate::bucket::{
    entry_file_name, parse_entry_name, parse_sub_bucket, parse_top_bucket, sub_bucket,
    sub_bucket_dir, top_bucket, top_bucket_dir,
};
use crate::error::StoreError;

/// Suffix of the file a payload is written to before being renamed into place.
const TEMP_SUFFIX: &str = ".tmp";

/// Result of reconciling one block into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The exact `(height, hash)` entry was already present and was the only
    /// entry at its height.
    Unchanged,

    /// The exact entry was already present at `path`, but other hashes were
    /// also archived at that height. Those files were deleted.
    Pruned {
        path: PathBuf,
        superseded: Vec<PathBuf>,
    },

    /// The payload was written to `path`.
    ///
    /// `superseded` lists files for the same height under a different hash
    /// that were deleted first. A non-empty list means a reorg was observed.
    Stored {
        path: PathBuf,
        superseded: Vec<PathBuf>,
    },
}

impl ReconcileOutcome {
    /// Files deleted because they held another hash for the same height.
    pub fn superseded(&self) -> &[PathBuf] {
        match self {
            ReconcileOutcome::Unchanged => &[],
            ReconcileOutcome::Pruned { superseded, .. }
            | ReconcileOutcome::Stored { superseded, .. } => superseded,
        }
    }

    pub fn is_reorg(&self) -> bool {
        !self.superseded().is_empty()
    }
}

/// Height-bucketed block archive rooted at a directory.
///
/// The tip is never persisted separately; it is recomputed from the layout
/// by [`BlockStore::highest_stored_height`]. Not safe against concurrent
/// writers: callers run one reconciliation at a time.
#[derive(Debug, Clone)]
pub struct BlockStore {
    root: PathBuf,
    extension: String,
}

impl BlockStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn with_default_extension(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_BLOCK_EXTENSION)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the entry for `(height, hash)`. Pure, performs no I/O.
    pub fn locate_path(&self, height: Height, hash: &BlockHash) -> PathBuf {
        self.bucket_path(height)
            .join(entry_file_name(height, hash, &self.extension))
    }

    fn bucket_path(&self, height: Height) -> PathBuf {
        self.root
            .join(top_bucket_dir(top_bucket(height)))
            .join(sub_bucket_dir(sub_bucket(height)))
    }

    /// Greatest height with an entry on disk, or `None` for an empty archive.
    ///
    /// Walks the hierarchy top-down (highest top bucket, then highest
    /// sub-bucket, then highest file name) and falls back to lower buckets
    /// when a higher one exists but holds nothing. Missing directories are
    /// treated as empty buckets.
    pub fn highest_stored_height(&self) -> Result<Option<Height>, StoreError> {
        let mut tops: Vec<u64> = list_names(&self.root)?
            .iter()
            .filter_map(|name| parse_top_bucket(name))
            .collect();
        tops.sort_unstable_by(|a, b| b.cmp(a));

        for top in tops {
            let top_path = self.root.join(top_bucket_dir(top));
            let mut subs: Vec<u64> = list_names(&top_path)?
                .iter()
                .filter_map(|name| parse_sub_bucket(name, top))
                .collect();
            subs.sort_unstable_by(|a, b| b.cmp(a));

            for sub in subs {
                let highest = list_names(&top_path.join(sub_bucket_dir(sub)))?
                    .iter()
                    .filter_map(|name| parse_entry_name(name, &self.extension))
                    .map(|(height, _)| height)
                    .filter(|height| sub_bucket(*height) == sub)
                    .max();

                if highest.is_some() {
                    return Ok(highest);
                }
            }
        }

        Ok(None)
    }

    /// All entries stored for `height`, normally zero or one.
    pub fn entries_at(&self, height: Height) -> Result<Vec<(BlockHash, PathBuf)>, StoreError> {
        let dir = self.bucket_path(height);

        let mut entries: Vec<(BlockHash, PathBuf)> = list_names(&dir)?
            .into_iter()
            .filter_map(|name| {
                let (entry_height, hash) = parse_entry_name(&name, &self.extension)?;
                (entry_height == height).then(|| (hash, dir.join(name)))
            })
            .collect();
        entries.sort();

        Ok(entries)
    }

    /// Hash currently archived for `height`, if any.
    pub fn stored_hash(&self, height: Height) -> Result<Option<BlockHash>, StoreError> {
        Ok(self
            .entries_at(height)?
            .into_iter()
            .next()
            .map(|(hash, _)| hash))
    }

    /// Makes the archive hold exactly `payload` under `(height, hash)`.
    ///
    /// - Entries for `height` under other hashes are always deleted first.
    /// - Exact entry already present: nothing is written. Returns
    ///   [`ReconcileOutcome::Unchanged`], or [`ReconcileOutcome::Pruned`] if
    ///   other entries had to be deleted.
    /// - Otherwise the payload is written.
    ///
    /// Bucket directories are created as needed. The payload goes to a
    /// temporary file first and is renamed into place; temporaries left at
    /// `height` by an interrupted write are removed.
    pub fn reconcile(
        &self,
        height: Height,
        hash: &BlockHash,
        payload: &[u8],
    ) -> Result<ReconcileOutcome, StoreError> {
        self.remove_temporaries(height)?;

        let (current, stale): (Vec<_>, Vec<_>) = self
            .entries_at(height)?
            .into_iter()
            .partition(|(stored, _)| stored == hash);

        let mut superseded = Vec::with_capacity(stale.len());
        for (stale_hash, stale_path) in stale {
            fs::remove_file(&stale_path).map_err(|err| StoreError::io(&stale_path, err))?;
            warn!(
                height = height.0,
                stale = %stale_hash,
                replacement = %hash,
                "Removed superseded block file"
            );
            superseded.push(stale_path);
        }

        if let Some((_, path)) = current.into_iter().next() {
            debug!(height = height.0, hash = %hash, "Block already archived");
            if superseded.is_empty() {
                return Ok(ReconcileOutcome::Unchanged);
            }
            return Ok(ReconcileOutcome::Pruned { path, superseded });
        }

        let path = self.locate_path(height, hash);
        let dir = self.bucket_path(height);
        fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;

        let tmp_path = path.with_extension(format!("{}{TEMP_SUFFIX}", self.extension));
        fs::write(&tmp_path, payload).map_err(|err| StoreError::io(&tmp_path, err))?;
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&path, err));
        }

        debug!(
            height = height.0,
            hash = %hash,
            size = payload.len(),
            "Archived block"
        );

        Ok(ReconcileOutcome::Stored { path, superseded })
    }

    /// Deletes temporary payload files for `height`, whatever their hash.
    fn remove_temporaries(&self, height: Height) -> Result<(), StoreError> {
        let dir = self.bucket_path(height);

        for name in list_names(&dir)? {
            let is_temporary = name
                .strip_suffix(TEMP_SUFFIX)
                .and_then(|entry| parse_entry_name(entry, &self.extension))
                .is_some_and(|(entry_height, _)| entry_height == height);
            if !is_temporary {
                continue;
            }

            let path = dir.join(&name);
            fs::remove_file(&path).map_err(|err| StoreError::io(&path, err))?;
            debug!(height = height.0, path = %path.display(), "Removed leftover temporary file");
        }

        Ok(())
    }
}

/// UTF-8 names of the entries in `dir`. A missing directory lists as empty.
fn list_names(dir: &Path) -> Result<Vec<String>, StoreError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::io(dir, err)),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|err| StoreError::io(dir, err))?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }

    Ok(names)
}
