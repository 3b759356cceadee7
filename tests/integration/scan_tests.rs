use filetime::{set_file_mtime, FileTime};
use image::GrayImage;
use imgsift::cache::{default_cache_path, FingerprintStore};
use imgsift::compare::SimilarityComparator;
use imgsift::duplicates::{
    CancelCadence, DuplicateScanner, FileError, ScanConfig, ScanOutcome, ScanState,
};
use imgsift::fingerprint::{FingerprintCodec, HashSize};
use imgsift::scanner::{collect_candidates, Candidate, CandidateScope};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn size8() -> HashSize {
    HashSize::new(8).unwrap()
}

/// Horizontal gradient, brightening left to right or the reverse.
fn write_gradient(path: &Path, rising: bool) {
    let img = GrayImage::from_fn(90, 80, |x, _| {
        let v = (x * 2) as u8;
        image::Luma([if rising { v } else { 200 - v }])
    });
    img.save(path).unwrap();
}

fn collection() -> TempDir {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("cats")).unwrap();
    dir
}

fn candidates(root: &Path) -> Vec<Candidate> {
    collect_candidates(root, &CandidateScope::AllFolders).unwrap()
}

fn scanner(threshold: u32) -> DuplicateScanner {
    DuplicateScanner::new(
        FingerprintCodec::new(size8()),
        SimilarityComparator::new(),
        ScanConfig::default().with_threshold(threshold),
    )
}

#[test]
fn test_identical_images_pair_at_zero_threshold() {
    let dir = collection();
    write_gradient(&dir.path().join("cats/a.png"), true);
    write_gradient(&dir.path().join("cats/b.png"), true);
    write_gradient(&dir.path().join("cats/c.png"), false);

    let mut store = FingerprintStore::new(size8());
    let mut scan = scanner(0);
    let outcome = scan.scan(&candidates(dir.path()), &mut store);

    let report = outcome.report().unwrap();
    assert_eq!(scan.state(), ScanState::Done);
    assert_eq!(report.pairs.len(), 1);
    let pair = &report.pairs[0];
    assert_eq!(pair.first, "cats/a.png");
    assert_eq!(pair.second, "cats/b.png");
    assert_eq!(pair.distance, 0);
    assert_eq!(report.stats.comparisons, 3);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_rescan_uses_cache() {
    let dir = collection();
    write_gradient(&dir.path().join("cats/a.png"), true);
    write_gradient(&dir.path().join("cats/b.png"), false);
    let cache = default_cache_path(dir.path());

    let mut store = FingerprintStore::load(&cache, size8()).unwrap();
    let first = scanner(12).scan(&candidates(dir.path()), &mut store);
    assert_eq!(first.stats().cache_misses, 2);
    store.save(&cache).unwrap();

    let mut store = FingerprintStore::load(&cache, size8()).unwrap();
    let second = scanner(12).scan(&candidates(dir.path()), &mut store);
    assert_eq!(second.stats().cache_hits, 2);
    assert_eq!(second.stats().cache_misses, 0);
    assert_eq!(
        first.report().unwrap().pairs,
        second.report().unwrap().pairs
    );
}

#[test]
fn test_modified_file_is_recomputed() {
    let dir = collection();
    let path = dir.path().join("cats/a.png");
    write_gradient(&path, true);
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let mut store = FingerprintStore::new(size8());
    scanner(0).scan(&candidates(dir.path()), &mut store);
    let before = store.get("cats/a.png").unwrap().clone();
    assert_eq!(before.mod_time, 1_600_000_000);

    write_gradient(&path, false);
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();

    let outcome = scanner(0).scan(&candidates(dir.path()), &mut store);
    assert_eq!(outcome.stats().cache_misses, 1);
    let after = store.get("cats/a.png").unwrap();
    assert_eq!(after.mod_time, 1_600_000_100);
    assert_ne!(after.fingerprint, before.fingerprint);
}

#[test]
fn test_undecodable_file_is_reported_not_fatal() {
    let dir = collection();
    write_gradient(&dir.path().join("cats/a.png"), true);
    fs::write(dir.path().join("cats/broken.png"), b"definitely not a png").unwrap();

    let mut store = FingerprintStore::new(size8());
    let outcome = scanner(64).scan(&candidates(dir.path()), &mut store);

    let report = outcome.report().unwrap();
    assert!(report.pairs.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "cats/broken.png");
    assert!(matches!(report.failures[0].error, FileError::Decode(_)));
    assert_eq!(report.stats.failed, 1);
    assert!(store.get("cats/broken.png").is_none());
    assert!(store.get("cats/a.png").is_some());
}

#[test]
fn test_deleted_file_drops_cache_entry() {
    let dir = collection();
    let doomed = dir.path().join("cats/b.png");
    write_gradient(&dir.path().join("cats/a.png"), true);
    write_gradient(&doomed, true);

    let listed = candidates(dir.path());
    let mut store = FingerprintStore::new(size8());
    scanner(0).scan(&listed, &mut store);
    assert_eq!(store.len(), 2);

    // Same candidate list, but the file vanished in between.
    fs::remove_file(&doomed).unwrap();
    let outcome = scanner(0).scan(&listed, &mut store);
    let report = outcome.report().unwrap();
    assert!(matches!(report.failures[0].error, FileError::Missing));
    assert!(store.get("cats/b.png").is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_cancelled_scan_persists_partial_work() {
    let dir = collection();
    for name in ["a", "b", "c", "d", "e"] {
        write_gradient(&dir.path().join(format!("cats/{name}.png")), true);
    }
    let cache = default_cache_path(dir.path());

    // Two polls pass, the third cancels before the third file.
    let polls = Arc::new(AtomicUsize::new(0));
    let seen = polls.clone();
    let config = ScanConfig::default()
        .with_cadence(CancelCadence::Items(1))
        .with_cancel_check(Arc::new(move || seen.fetch_add(1, Ordering::SeqCst) >= 2));
    let mut scan = DuplicateScanner::new(
        FingerprintCodec::new(size8()),
        SimilarityComparator::new(),
        config,
    );

    let mut store = FingerprintStore::new(size8());
    let outcome = scan.scan(&candidates(dir.path()), &mut store);
    assert!(matches!(outcome, ScanOutcome::Cancelled(_)));
    assert_eq!(scan.state(), ScanState::Cancelled);
    store.save(&cache).unwrap();

    let reloaded = FingerprintStore::load(&cache, size8()).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.get("cats/a.png").is_some());
    assert!(reloaded.get("cats/b.png").is_some());
    assert!(reloaded.get("cats/c.png").is_none());
}

#[test]
fn test_parallel_scan_matches_sequential() {
    let dir = collection();
    for (name, rising) in [("a", true), ("b", false), ("c", true), ("d", false)] {
        write_gradient(&dir.path().join(format!("cats/{name}.png")), rising);
    }
    let listed = candidates(dir.path());

    let mut seq_store = FingerprintStore::new(size8());
    let sequential = scanner(4).scan(&listed, &mut seq_store);

    let mut par_store = FingerprintStore::new(size8());
    let mut parallel = DuplicateScanner::new(
        FingerprintCodec::new(size8()),
        SimilarityComparator::new(),
        ScanConfig::default().with_threshold(4).parallel(2),
    );
    let concurrent = parallel.scan(&listed, &mut par_store);

    assert_eq!(
        sequential.report().unwrap().pairs,
        concurrent.report().unwrap().pairs
    );
    assert_eq!(sequential.report().unwrap().pairs.len(), 2);
    for entry in seq_store.iter() {
        assert_eq!(par_store.get(&entry.key), Some(entry));
    }
}

#[test]
fn test_trash_and_hidden_folders_are_skipped() {
    let dir = collection();
    for folder in ["Trash", ".thumbs", "$RECYCLE"] {
        fs::create_dir(dir.path().join(folder)).unwrap();
        write_gradient(&dir.path().join(folder).join("x.png"), true);
    }
    write_gradient(&dir.path().join("cats/a.png"), true);
    write_gradient(&dir.path().join("top.png"), true);

    let keys: Vec<_> = candidates(dir.path()).into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["cats/a.png"]);

    let root_only = collect_candidates(dir.path(), &CandidateScope::Folder(".".into())).unwrap();
    assert_eq!(root_only.len(), 1);
    assert_eq!(root_only[0].key, "top.png");
}
