use imgsift::cache::{default_cache_path, DiscardReason, FingerprintStore, StoreError};
use imgsift::compare::{SimilarityComparator, MAX_DISTANCE};
use imgsift::config::Invalidation;
use imgsift::fingerprint::{Fingerprint, HashSize};
use std::fs;
use tempfile::tempdir;

fn size(n: u8) -> HashSize {
    HashSize::new(n).unwrap()
}

fn fp(n: u8, fill: u8) -> Fingerprint {
    Fingerprint::from_bytes(vec![fill; size(n).byte_len()])
}

#[test]
fn test_save_then_load_reproduces_entries() {
    let dir = tempdir().unwrap();
    let path = default_cache_path(dir.path());

    let mut store = FingerprintStore::new(size(8));
    store.put("cats/a.png", fp(8, 0x11), 1_700_000_000).unwrap();
    store.put("cats/b.png", fp(8, 0x22), 1_700_000_001).unwrap();
    store.put("dogs/c.gif", fp(8, 0x33), 5).unwrap();
    store.delete("cats/b.png");
    store.save(&path).unwrap();

    let loaded = FingerprintStore::load(&path, size(8)).unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.get("cats/b.png").is_none());
    let a = loaded.get("cats/a.png").unwrap();
    assert_eq!(a.fingerprint, fp(8, 0x11));
    assert_eq!(a.mod_time, 1_700_000_000);

    let keys: Vec<_> = loaded.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["cats/a.png", "dogs/c.gif"]);
}

#[test]
fn test_hash_size_mismatch_loads_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");

    let mut store = FingerprintStore::new(size(16));
    store.put("a.png", fp(16, 0xff), 1).unwrap();
    store.save(&path).unwrap();

    let loaded = FingerprintStore::load(&path, size(8)).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.hash_size(), size(8));
    assert_eq!(
        loaded.discard_reason(),
        Some(DiscardReason::HashSizeMismatch {
            found: 16,
            expected: size(8)
        })
    );

    // The file itself is untouched until the next save.
    let again = FingerprintStore::load(&path, size(16)).unwrap();
    assert_eq!(again.len(), 1);
}

#[test]
fn test_file_layout_is_big_endian() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");

    let mut store = FingerprintStore::new(size(4));
    store
        .put("x.png", Fingerprint::from_bytes(vec![0xab, 0xcd]), 0x0a0b_0c0d)
        .unwrap();
    store.save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(
        bytes,
        [
            &[4u8, 0, 0, 0, 1][..],
            b"x.png\0",
            &[0x0a, 0x0b, 0x0c, 0x0d],
            &[0xab, 0xcd],
        ]
        .concat()
    );
}

#[test]
fn test_rekey_survives_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");

    let mut store = FingerprintStore::new(size(8));
    store.put("inbox/a.png", fp(8, 7), 42).unwrap();
    assert!(store.rekey("inbox/a.png", "sorted/a.png").unwrap());
    store.save(&path).unwrap();

    let loaded = FingerprintStore::load(&path, size(8)).unwrap();
    assert!(loaded.get("inbox/a.png").is_none());
    let moved = loaded.get("sorted/a.png").unwrap();
    assert_eq!(moved.mod_time, 42);
    assert_eq!(moved.fingerprint, fp(8, 7));
}

#[test]
fn test_clear_then_save_writes_empty_cache() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");

    let mut store = FingerprintStore::new(size(8));
    store.put("a.png", fp(8, 1), 1).unwrap();
    store.clear();
    store.save(&path).unwrap();

    assert_eq!(fs::read(&path).unwrap(), vec![8, 0, 0, 0, 0]);
}

#[test]
fn test_invalidation_on_frame_change() {
    let mut store = FingerprintStore::new(size(8));
    store.put("a.jpg", fp(8, 1), 1).unwrap();
    store.put("b.webm", fp(8, 2), 1).unwrap();

    store.apply_invalidation(Invalidation::VideosOnly, size(8));
    assert_eq!(store.len(), 1);
    assert!(store.get("a.jpg").is_some());

    store.apply_invalidation(Invalidation::None, size(8));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_save_failure_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("imgSort.cache");

    let err = FingerprintStore::new(size(8)).save(&path).unwrap_err();
    assert!(matches!(err, StoreError::Write { .. }));
    assert!(err.to_string().contains("imgSort.cache"));
}

#[test]
fn test_length_mismatch_is_never_a_duplicate() {
    let comparator = SimilarityComparator::new();
    let small = fp(8, 0);
    let large = fp(12, 0);

    assert_eq!(comparator.distance(small.as_bytes(), large.as_bytes()), MAX_DISTANCE);
    for threshold in [0, 10, 1000, u32::MAX] {
        assert!(!comparator.is_duplicate(small.as_bytes(), large.as_bytes(), threshold));
    }
}
