use std::fs;
use std::path::Path;

use archive::{BlockStore, ReconcileOutcome};
use containers::{BlockHash, Height};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn hash(byte: u8) -> BlockHash {
    BlockHash::repeat_byte(byte)
}

fn files_under(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(path) = stack.pop() {
        for entry in fs::read_dir(&path).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            } else {
                out.push(entry.file_name().into_string().unwrap());
            }
        }
    }
    out.sort();
    out
}

#[test]
fn test_reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    let first = store.reconcile(Height(42), &hash(7), b"block-42").unwrap();
    let path = match first {
        ReconcileOutcome::Stored { path, superseded } => {
            assert!(superseded.is_empty());
            path
        }
        other => panic!("expected a write, got {other:?}"),
    };
    let modified = fs::metadata(&path).unwrap().modified().unwrap();

    let second = store.reconcile(Height(42), &hash(7), b"block-42").unwrap();
    assert_eq!(second, ReconcileOutcome::Unchanged);

    assert_eq!(store.entries_at(Height(42)).unwrap().len(), 1);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    assert_eq!(files_under(dir.path()).len(), 1);
}

#[test]
fn test_reconcile_replaces_reorged_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    store.reconcile(Height(10), &hash(0xa), b"old").unwrap();
    let old_path = store.locate_path(Height(10), &hash(0xa));
    assert!(old_path.exists());

    let outcome = store.reconcile(Height(10), &hash(0xb), b"new").unwrap();
    let new_path = store.locate_path(Height(10), &hash(0xb));
    assert_eq!(
        outcome,
        ReconcileOutcome::Stored {
            path: new_path.clone(),
            superseded: vec![old_path.clone()],
        }
    );

    assert!(!old_path.exists());
    assert_eq!(fs::read(&new_path).unwrap(), b"new");

    let entries = store.entries_at(Height(10)).unwrap();
    assert_eq!(entries, vec![(hash(0xb), new_path)]);
}

#[test]
fn test_reconcile_removes_every_stale_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    // Two stale files for one height, e.g. left by an external copy.
    store.reconcile(Height(1), &hash(1), b"one").unwrap();
    let stray = store.locate_path(Height(1), &hash(2));
    fs::write(&stray, b"two").unwrap();
    assert_eq!(store.entries_at(Height(1)).unwrap().len(), 2);

    let outcome = store.reconcile(Height(1), &hash(3), b"three").unwrap();
    match outcome {
        ReconcileOutcome::Stored { superseded, .. } => assert_eq!(superseded.len(), 2),
        other => panic!("expected a write, got {other:?}"),
    }
    assert_eq!(store.stored_hash(Height(1)).unwrap(), Some(hash(3)));
    assert_eq!(store.entries_at(Height(1)).unwrap().len(), 1);
}

#[test]
fn test_reconcile_same_hash_removes_leftover_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    store.reconcile(Height(1), &hash(1), b"one").unwrap();
    let kept = store.locate_path(Height(1), &hash(1));
    let stray = store.locate_path(Height(1), &hash(2));
    fs::write(&stray, b"two").unwrap();

    let outcome = store.reconcile(Height(1), &hash(1), b"one").unwrap();

    assert_eq!(outcome.superseded(), &[stray.clone()]);
    assert!(matches!(outcome, ReconcileOutcome::Pruned { ref path, .. } if *path == kept));
    assert_eq!(store.entries_at(Height(1)).unwrap(), vec![(hash(1), kept.clone())]);
    assert_eq!(fs::read(&kept).unwrap(), b"one");
}

#[test]
fn test_reorg_after_interrupted_write_leaves_no_temporary() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    store.reconcile(Height(7), &hash(1), b"old").unwrap();
    let orphan = store
        .locate_path(Height(7), &hash(2))
        .with_extension("bin.tmp");
    fs::write(&orphan, b"half written").unwrap();

    store.reconcile(Height(7), &hash(3), b"new").unwrap();

    assert!(!orphan.exists());
    assert_eq!(files_under(dir.path()), vec![format!("7_{}.bin", hash(3))]);
}

#[test]
fn test_other_heights_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    // 10 and 100 share a directory with 1; only the exact height is matched.
    store.reconcile(Height(1), &hash(1), b"1").unwrap();
    store.reconcile(Height(10), &hash(10), b"10").unwrap();
    store.reconcile(Height(100), &hash(100), b"100").unwrap();

    store.reconcile(Height(1), &hash(2), b"1'").unwrap();

    assert_eq!(store.stored_hash(Height(10)).unwrap(), Some(hash(10)));
    assert_eq!(store.stored_hash(Height(100)).unwrap(), Some(hash(100)));
    assert_eq!(files_under(dir.path()).len(), 3);
}

#[test]
fn test_highest_stored_height_empty_archive() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());
    assert_eq!(store.highest_stored_height().unwrap(), None);
}

#[rstest]
#[case(&[0], 0)]
#[case(&[0, 1, 2, 999], 999)]
#[case(&[998, 999, 1_000], 1_000)]
#[case(&[5, 99_999, 100_000], 100_000)]
#[case(&[7, 123_456, 100_001], 123_456)]
#[case(&[250_000, 1_200_001, 99], 1_200_001)]
fn test_highest_stored_height(#[case] heights: &[u64], #[case] expected: u64) {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());

    for (i, height) in heights.iter().enumerate() {
        store
            .reconcile(Height(*height), &hash(i as u8), b"payload")
            .unwrap();
    }

    assert_eq!(store.highest_stored_height().unwrap(), Some(Height(expected)));
}

#[test]
fn test_highest_stored_height_skips_empty_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());
    store.reconcile(Height(4_321), &hash(1), b"x").unwrap();

    // Partially created hierarchy above the real tip.
    fs::create_dir_all(dir.path().join("200k")).unwrap();
    fs::create_dir_all(dir.path().join("100k").join("150000")).unwrap();
    fs::create_dir_all(dir.path().join("0").join("9000")).unwrap();

    assert_eq!(store.highest_stored_height().unwrap(), Some(Height(4_321)));
}

#[test]
fn test_highest_stored_height_ignores_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::with_default_extension(dir.path());
    store.reconcile(Height(12), &hash(1), b"x").unwrap();

    fs::create_dir_all(dir.path().join(".git").join("objects")).unwrap();
    fs::write(dir.path().join(".gitattributes"), "*.bin filter=lfs").unwrap();
    fs::write(dir.path().join("0").join("0").join("README"), "notes").unwrap();
    fs::write(
        dir.path().join("0").join("0").join(format!("900_{}.hex", hash(2))),
        "other extension",
    )
    .unwrap();
    fs::write(
        dir.path().join("0").join("0").join(format!("950_{}.bin.tmp", hash(3))),
        "interrupted write",
    )
    .unwrap();

    assert_eq!(store.highest_stored_height().unwrap(), Some(Height(12)));
}

#[test]
fn test_custom_extension() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlockStore::new(dir.path(), "hex");
    store.reconcile(Height(2), &hash(2), b"00ff").unwrap();

    assert_eq!(files_under(dir.path()), vec![format!("2_{}.hex", hash(2))]);
    assert_eq!(
        BlockStore::with_default_extension(dir.path())
            .highest_stored_height()
            .unwrap(),
        None
    );
}
