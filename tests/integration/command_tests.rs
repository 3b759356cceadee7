use clap::Parser;
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, GrayImage, Rgba, RgbaImage};
use imgsift::cache::{default_cache_path, CacheMeta, FingerprintStore};
use imgsift::cli::Cli;
use imgsift::error::ExitCode;
use imgsift::fingerprint::{Fingerprint, HashSize};
use imgsift::signal::ShutdownHandler;
use imgsift::{run_app, run_app_with_shutdown};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

// Every command gets its own settings file and explicit sizes, so nothing
// here depends on the user's configuration or IMGSIFT_* variables.

struct Collection {
    dir: TempDir,
    settings: TempDir,
}

impl Collection {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("cats")).unwrap();
        Self {
            dir,
            settings: tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root().join("cats").join(name)
    }

    fn cache(&self) -> PathBuf {
        default_cache_path(self.root())
    }

    fn config(&self) -> PathBuf {
        self.settings.path().join("config.toml")
    }

    fn command(&self, args: &[&str]) -> Cli {
        let config = self.config();
        let mut argv = vec!["imgsift", "-q", "--config", config.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn scan(&self, extra: &[&str]) -> ExitCode {
        let root = self.root().to_str().unwrap().to_string();
        let mut args = vec!["scan", root.as_str(), "--hash-size", "8"];
        args.extend_from_slice(extra);
        run_app(self.command(&args)).unwrap()
    }

    fn store(&self) -> FingerprintStore {
        FingerprintStore::load_any(&self.cache()).unwrap().unwrap()
    }

    fn hex(&self, key: &str) -> String {
        self.store().get(key).unwrap().fingerprint.to_hex()
    }
}

fn size(n: u8) -> HashSize {
    HashSize::new(n).unwrap()
}

/// Horizontal gradient, brightening left to right or the reverse.
fn gradient(rising: bool) -> GrayImage {
    GrayImage::from_fn(90, 80, |x, _| {
        let v = (x * 2) as u8;
        image::Luma([if rising { v } else { 200 - v }])
    })
}

/// Two-frame GIF: a rising gradient followed by a falling one.
fn write_reversing_gif(path: &Path) {
    let mut encoder = GifEncoder::new(File::create(path).unwrap());
    for rising in [true, false] {
        let gray = gradient(rising);
        let rgba = RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y).0[0];
            Rgba([v, v, v, 255])
        });
        encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(100, 1)))
            .unwrap();
    }
}

#[test]
fn test_scan_refingerprints_gif_when_frame_changes() {
    let col = Collection::new();
    write_reversing_gif(&col.file("anim.gif"));

    col.scan(&["--anim-frame", "0", "--threshold", "0"]);
    let first = col.hex("cats/anim.gif");
    assert_eq!(CacheMeta::load(&col.cache()), Some(CacheMeta { anim_frame: 0 }));

    col.scan(&["--anim-frame", "1", "--threshold", "0"]);
    assert_ne!(col.hex("cats/anim.gif"), first);
    assert_eq!(CacheMeta::load(&col.cache()), Some(CacheMeta { anim_frame: 1 }));

    // Back to the first frame reproduces the first fingerprint.
    col.scan(&["--anim-frame", "0", "--threshold", "0"]);
    assert_eq!(col.hex("cats/anim.gif"), first);
}

#[test]
fn test_scan_without_frame_record_refingerprints_videos() {
    let col = Collection::new();
    write_reversing_gif(&col.file("anim.gif"));
    gradient(true).save(col.file("a.png")).unwrap();

    col.scan(&["--anim-frame", "0", "--threshold", "0"]);
    let gif = col.hex("cats/anim.gif");
    let png = col.hex("cats/a.png");

    // Plant stale fingerprints under the current mtimes, then lose the record.
    let mut store = col.store();
    let mtimes: Vec<_> = store.iter().map(|e| (e.key.clone(), e.mod_time)).collect();
    for (key, mod_time) in mtimes {
        store
            .put(&key, Fingerprint::from_bytes(vec![0xa5; 8]), mod_time)
            .unwrap();
    }
    store.save(&col.cache()).unwrap();
    CacheMeta::remove(&col.cache());

    col.scan(&["--anim-frame", "0", "--threshold", "0"]);
    assert_eq!(col.hex("cats/anim.gif"), gif);
    assert_ne!(col.hex("cats/a.png"), png);
    assert_eq!(col.hex("cats/a.png"), "a5a5a5a5a5a5a5a5");
    assert_eq!(CacheMeta::load(&col.cache()), Some(CacheMeta { anim_frame: 0 }));
}

#[test]
fn test_scan_exit_codes() {
    let col = Collection::new();
    gradient(true).save(col.file("a.png")).unwrap();
    gradient(false).save(col.file("b.png")).unwrap();
    assert_eq!(col.scan(&["--threshold", "0"]), ExitCode::NoDuplicates);

    gradient(true).save(col.file("c.png")).unwrap();
    assert_eq!(col.scan(&["--threshold", "0"]), ExitCode::Success);
    assert!(!col.root().join("failed.txt").exists());
}

#[test]
fn test_scan_with_failures_writes_failed_list() {
    let col = Collection::new();
    gradient(true).save(col.file("a.png")).unwrap();
    gradient(true).save(col.file("b.png")).unwrap();
    fs::write(col.file("broken.png"), b"not an image").unwrap();

    assert_eq!(col.scan(&["--threshold", "0"]), ExitCode::PartialSuccess);

    let failed = fs::read_to_string(col.root().join("failed.txt")).unwrap();
    let lines: Vec<_> = failed.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("cats/broken.png\t"), "{}", lines[0]);
    assert!(col.store().get("cats/a.png").is_some());
}

#[test]
fn test_cancelled_scan_saves_cache() {
    let col = Collection::new();
    gradient(true).save(col.file("a.png")).unwrap();
    assert_eq!(col.scan(&["--threshold", "0"]), ExitCode::NoDuplicates);
    let a = col.hex("cats/a.png");

    gradient(false).save(col.file("b.png")).unwrap();
    let shutdown = ShutdownHandler::new();
    shutdown.request_shutdown();
    let root = col.root().to_str().unwrap();
    let cli = col.command(&["scan", root, "--hash-size", "8", "--threshold", "0"]);

    assert_eq!(run_app_with_shutdown(cli, &shutdown).unwrap(), ExitCode::Interrupted);
    assert_eq!(col.hex("cats/a.png"), a);
    assert!(!col.root().join("failed.txt").exists());
}

#[test]
fn test_config_set_hash_size_rebuilds_cache() {
    let col = Collection::new();
    let mut store = FingerprintStore::new(size(16));
    store
        .put("cats/a.png", Fingerprint::from_bytes(vec![1; 32]), 1)
        .unwrap();
    store.save(&col.cache()).unwrap();

    let root = col.root().to_str().unwrap();
    let code = run_app(col.command(&["config", "set", "--hash-size", "8", "--root", root])).unwrap();
    assert_eq!(code, ExitCode::Success);

    let store = col.store();
    assert_eq!(store.hash_size(), size(8));
    assert!(store.is_empty());
    assert_eq!(fs::read(col.cache()).unwrap(), vec![8, 0, 0, 0, 0]);
    assert!(fs::read_to_string(col.config())
        .unwrap()
        .contains("hash_size = 8"));
}

#[test]
fn test_config_set_anim_frame_drops_only_videos() {
    let col = Collection::new();
    let mut store = FingerprintStore::new(size(8));
    for key in ["cats/a.png", "cats/b.gif", "cats/c.mp4"] {
        store
            .put(key, Fingerprint::from_bytes(vec![7; 8]), 1)
            .unwrap();
    }
    store.save(&col.cache()).unwrap();
    CacheMeta { anim_frame: 0 }.save(&col.cache()).unwrap();

    let root = col.root().to_str().unwrap();
    let code = run_app(col.command(&[
        "config", "set", "--hash-size", "8", "--anim-frame", "2", "--root", root,
    ]))
    .unwrap();
    assert_eq!(code, ExitCode::Success);

    let keys: Vec<_> = col.store().iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, vec!["cats/a.png"]);
    assert_eq!(CacheMeta::load(&col.cache()), Some(CacheMeta { anim_frame: 2 }));
}

#[test]
fn test_config_set_same_frame_keeps_videos() {
    let col = Collection::new();
    let mut store = FingerprintStore::new(size(8));
    store
        .put("cats/b.gif", Fingerprint::from_bytes(vec![7; 8]), 1)
        .unwrap();
    store.save(&col.cache()).unwrap();
    CacheMeta { anim_frame: 2 }.save(&col.cache()).unwrap();

    let root = col.root().to_str().unwrap();
    run_app(col.command(&[
        "config", "set", "--hash-size", "8", "--anim-frame", "2", "--root", root,
    ]))
    .unwrap();

    assert!(col.store().get("cats/b.gif").is_some());
}
