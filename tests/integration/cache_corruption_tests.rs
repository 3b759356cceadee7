use imgsift::cache::{DiscardReason, FingerprintStore, StoreError};
use imgsift::fingerprint::{Fingerprint, HashSize};
use std::fs;
use tempfile::tempdir;

fn size8() -> HashSize {
    HashSize::new(8).unwrap()
}

fn saved_bytes(keys: &[&str]) -> Vec<u8> {
    let mut store = FingerprintStore::new(size8());
    for (i, key) in keys.iter().enumerate() {
        store
            .put(key, Fingerprint::from_bytes(vec![i as u8; 8]), i as u32)
            .unwrap();
    }
    store.to_bytes()
}

#[test]
fn test_garbage_file_loads_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");
    fs::write(&path, b"\xffthis is not a cache").unwrap();

    let store = FingerprintStore::load(&path, size8()).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.discard_reason(), Some(DiscardReason::ReservedBitSet(0xff)));
}

#[test]
fn test_empty_file_loads_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");
    fs::write(&path, b"").unwrap();

    let store = FingerprintStore::load(&path, size8()).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.discard_reason(), Some(DiscardReason::TruncatedHeader));
}

#[test]
fn test_header_only_file_is_valid() {
    let store = FingerprintStore::from_bytes(&[8, 0, 0, 0, 0], size8());
    assert!(store.is_empty());
    assert!(store.discard_reason().is_none());
}

#[test]
fn test_every_truncation_keeps_a_prefix() {
    let keys = ["a.png", "bb.png", "ccc.png"];
    let bytes = saved_bytes(&keys);

    let mut previous = 0;
    for cut in 5..=bytes.len() {
        let store = FingerprintStore::from_bytes(&bytes[..cut], size8());
        assert!(store.len() >= previous, "entries vanished at {cut}");
        previous = store.len();

        // Whatever survived is a prefix, with intact values.
        for (i, entry) in store.iter().enumerate() {
            assert_eq!(entry.key, keys[i]);
            assert_eq!(entry.mod_time, i as u32);
            assert_eq!(entry.fingerprint.as_bytes(), &[i as u8; 8]);
        }
    }
    assert_eq!(previous, keys.len());
}

#[test]
fn test_invalid_utf8_key_stops_reading() {
    let mut bytes = saved_bytes(&["a.png"]);
    bytes.extend_from_slice(&[0xc3, 0x28, 0]);
    bytes.extend_from_slice(&[0; 4 + 8]);
    bytes.extend_from_slice(&saved_bytes(&["z.png"])[5..]);

    let store = FingerprintStore::from_bytes(&bytes, size8());
    assert_eq!(store.len(), 1);
    assert!(store.get("z.png").is_none());
}

#[test]
fn test_duplicate_keys_last_record_wins() {
    let first = saved_bytes(&["a.png"]);
    let mut bytes = first.clone();
    bytes.extend_from_slice(b"a.png\0");
    bytes.extend_from_slice(&9u32.to_be_bytes());
    bytes.extend_from_slice(&[0xee; 8]);

    let store = FingerprintStore::from_bytes(&bytes, size8());
    assert_eq!(store.len(), 1);
    let entry = store.get("a.png").unwrap();
    assert_eq!(entry.mod_time, 9);
    assert_eq!(entry.fingerprint.as_bytes(), &[0xee; 8]);
}

#[test]
fn test_load_any_rejects_unknown_hash_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");
    fs::write(&path, [7u8, 0, 0, 0, 0]).unwrap();

    let err = FingerprintStore::load_any(&path).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedHashSize { found: 7, .. }));
}

#[cfg(unix)]
#[test]
fn test_unreadable_cache_is_an_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("imgSort.cache");
    fs::write(&path, saved_bytes(&["a.png"])).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

    // Root can read anything; only check when permissions bite.
    if fs::read(&path).is_err() {
        let err = FingerprintStore::load(&path, size8()).unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
}
