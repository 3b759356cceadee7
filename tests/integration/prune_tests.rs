use filetime::{set_file_mtime, FileTime};
use imgsift::cache::{default_cache_path, FingerprintStore};
use imgsift::fingerprint::{Fingerprint, HashSize};
use imgsift::scanner::StdFileSystem;
use std::fs;
use tempfile::tempdir;

fn size8() -> HashSize {
    HashSize::new(8).unwrap()
}

fn fp() -> Fingerprint {
    Fingerprint::from_bytes(vec![0x5a; 8])
}

#[test]
fn test_prune_drops_missing_and_modified_files() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("cats")).unwrap();
    for name in ["kept.png", "edited.png"] {
        let path = dir.path().join("cats").join(name);
        fs::write(&path, b"x").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_000, 0)).unwrap();
    }

    let mut store = FingerprintStore::new(size8());
    store.put("cats/kept.png", fp(), 1_000).unwrap();
    store.put("cats/edited.png", fp(), 999).unwrap();
    store.put("cats/gone.png", fp(), 1_000).unwrap();

    let mut removed = store.retain_existing(dir.path(), &StdFileSystem);
    removed.sort();
    assert_eq!(removed, vec!["cats/edited.png", "cats/gone.png"]);
    assert_eq!(store.len(), 1);
    assert!(store.get("cats/kept.png").is_some());
}

#[test]
fn test_prune_result_persists() {
    let dir = tempdir().unwrap();
    let cache = default_cache_path(dir.path());

    let mut store = FingerprintStore::new(size8());
    store.put("cats/gone.png", fp(), 1).unwrap();
    store.save(&cache).unwrap();

    let mut store = FingerprintStore::load_any(&cache).unwrap().unwrap();
    assert_eq!(store.retain_existing(dir.path(), &StdFileSystem).len(), 1);
    store.save(&cache).unwrap();

    assert_eq!(fs::read(&cache).unwrap(), vec![8, 0, 0, 0, 0]);
}

#[test]
fn test_decomposed_keys_are_normalized_on_load() {
    // "e" followed by a combining acute accent.
    let mut bytes = vec![8, 0, 0, 0, 1];
    bytes.extend_from_slice("cats/cafe\u{301}.png".as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&[0x5a; 8]);

    let store = FingerprintStore::from_bytes(&bytes, size8());
    let keys: Vec<_> = store.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["cats/caf\u{e9}.png"]);
    assert!(store.get("cats/cafe\u{301}.png").is_some());
}

#[test]
fn test_retain_keeps_insertion_order() {
    let mut store = FingerprintStore::new(size8());
    for key in ["c.png", "a.png", "b.mp4", "d.png"] {
        store.put(key, fp(), 1).unwrap();
    }
    assert_eq!(store.invalidate_videos(), 1);

    let keys: Vec<_> = store.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, vec!["c.png", "a.png", "d.png"]);
}
