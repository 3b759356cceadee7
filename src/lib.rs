//! imgsift - near-duplicate image and video finder
//!
//! Every candidate file is reduced to a difference hash (a few bytes
//! describing its coarse brightness gradients), fingerprints are cached per
//! collection in a compact binary file, and pairs whose fingerprints differ
//! in at most a threshold number of bits are reported.
//!
//! The pieces, bottom up:
//!
//! * [`fingerprint`]: dHash computation and the decoding collaborators
//! * [`compare`]: Hamming distance with early exit and popcount strategies
//! * [`cache`]: the persistent [`FingerprintStore`](cache::FingerprintStore)
//! * [`scanner`]: candidate discovery and modification times
//! * [`duplicates`]: the [`DuplicateScanner`](duplicates::DuplicateScanner) state machine
//!
//! [`run_app`] wires them to the command line.

pub mod cache;
pub mod cli;
pub mod compare;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use cache::{default_cache_path, CacheMeta, EntryView, FingerprintStore};
use cli::{CacheArgs, Cli, Commands, ConfigCommand, ConfigSetArgs, InspectArgs, OutputFormat, ScanArgs};
use compare::SimilarityComparator;
use config::{ConfigError, Invalidation, Settings};
use duplicates::{DuplicateScanner, ScanConfig, ScanOutcome};
use error::ExitCode;
use fingerprint::FingerprintCodec;
use output::{write_failed_list, JsonOutput, TextOutput, FAILED_LIST_NAME};
use progress::{Progress, ProgressCallback};
use scanner::{collect_candidates, CandidateScope, StdFileSystem};
use signal::ShutdownHandler;

/// Run the command described by `cli`, cancellable with Ctrl+C.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let shutdown = signal::install_handler()?;
    run_app_with_shutdown(cli, &shutdown)
}

/// Run the command described by `cli`; a scan stops once `shutdown` is
/// requested.
pub fn run_app_with_shutdown(cli: Cli, shutdown: &ShutdownHandler) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }
    let color = !cli.no_color && io::stdout().is_terminal();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    log::debug!("Effective settings: {:?}", settings);

    match cli.command {
        Commands::Scan(args) => run_scan(args, settings, shutdown, cli.quiet, color),
        Commands::Prune(args) => run_prune(&args),
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Config(ConfigCommand::Show) => run_config_show(settings, cli.config.as_deref()),
        Commands::Config(ConfigCommand::Set(args)) => {
            run_config_set(&args, settings, cli.config.as_deref())
        }
    }
}

fn cache_path(args: &CacheArgs) -> PathBuf {
    args.cache
        .clone()
        .unwrap_or_else(|| default_cache_path(&args.root))
}

/// Record the frame `store` was sampled at, or forget it if that fails.
///
/// A missing sidecar only costs recomputing videos; a stale one would
/// reuse fingerprints of the wrong frame.
fn record_frame(cache_path: &Path, anim_frame: u16) {
    if let Err(e) = (CacheMeta { anim_frame }).save(cache_path) {
        log::warn!("{e}");
        CacheMeta::remove(cache_path);
    }
}

fn run_scan(
    args: ScanArgs,
    settings: Settings,
    shutdown: &ShutdownHandler,
    quiet: bool,
    color: bool,
) -> Result<ExitCode> {
    let settings = Settings {
        hash_size: args.hash_size.unwrap_or(settings.hash_size),
        hash_diff: args.threshold.unwrap_or(settings.hash_diff),
        anim_frame: args.anim_frame.unwrap_or(settings.anim_frame),
    }
    .normalized();
    let hash_size = settings.hash_size();

    let scope = match args.folder {
        Some(folder) => CandidateScope::Folder(folder),
        None => CandidateScope::AllFolders,
    };
    let candidates = collect_candidates(&args.root, &scope)
        .with_context(|| format!("Failed to list {}", args.root.display()))?;

    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| default_cache_path(&args.root));
    let mut store = FingerprintStore::load(&cache_path, hash_size)?;
    let sampled = CacheMeta::load(&cache_path).map(|meta| meta.anim_frame);
    store.apply_invalidation(settings.cache_invalidation(store.hash_size(), sampled), hash_size);

    let progress: Arc<dyn ProgressCallback> = Arc::new(Progress::new(quiet));
    let mut config = ScanConfig::default()
        .with_threshold(settings.threshold())
        .with_cancel_check(shutdown.cancel_check())
        .with_progress_callback(progress);
    if args.parallel {
        config = config.parallel(args.threads.unwrap_or(0));
    }

    let codec = FingerprintCodec::new(hash_size).with_anim_frame(u32::from(settings.anim_frame));
    let mut scanner = DuplicateScanner::new(codec, SimilarityComparator::new(), config);
    let outcome = scanner.scan(&candidates, &mut store);

    // Saved whatever the outcome: a cancelled scan keeps its fingerprints.
    store
        .save(&cache_path)
        .context("Failed to save fingerprint cache")?;
    record_frame(&cache_path, settings.anim_frame);

    let report = match outcome {
        ScanOutcome::Done(report) => report,
        ScanOutcome::Cancelled(stats) => {
            log::warn!(
                "Scan cancelled; {} fingerprints computed so far were saved",
                stats.cache_misses
            );
            return Ok(ExitCode::Interrupted);
        }
    };

    if report.has_failures() {
        let failed_path = args
            .failed_list
            .clone()
            .unwrap_or_else(|| args.root.join(FAILED_LIST_NAME));
        if let Err(e) = write_failed_list(&failed_path, &report.failures) {
            log::warn!("Could not write {}: {}", failed_path.display(), e);
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(&report, color).write_to(&mut out)?,
        OutputFormat::Json => JsonOutput::new(&report).write_to(&mut out, true)?,
    }

    Ok(if report.has_failures() {
        ExitCode::PartialSuccess
    } else if report.has_duplicates() {
        ExitCode::Success
    } else {
        ExitCode::NoDuplicates
    })
}

fn run_prune(args: &CacheArgs) -> Result<ExitCode> {
    let path = cache_path(args);
    let Some(mut store) = FingerprintStore::load_any(&path)? else {
        log::info!("No cache at {}", path.display());
        return Ok(ExitCode::Success);
    };

    let removed = store.retain_existing(&args.root, &StdFileSystem);
    if !removed.is_empty() {
        store.save(&path).context("Failed to save pruned cache")?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for key in &removed {
        writeln!(out, "{key}")?;
    }
    log::info!("Pruned {} entries, {} remain", removed.len(), store.len());
    Ok(ExitCode::Success)
}

fn run_inspect(args: &InspectArgs) -> Result<ExitCode> {
    let path = cache_path(&args.cache);
    let store = FingerprintStore::load_any(&path)?
        .with_context(|| format!("No cache at {}", path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        let document = serde_json::json!({
            "hash_size": store.hash_size().get(),
            "entries": store.iter().map(EntryView::from).collect::<Vec<_>>(),
        });
        serde_json::to_writer_pretty(&mut out, &document)?;
        writeln!(out)?;
    } else {
        writeln!(out, "# hash size {}, {} entries", store.hash_size(), store.len())?;
        for entry in store.iter() {
            writeln!(
                out,
                "{}\t{}\t{}",
                entry.key,
                entry.mod_time,
                entry.fingerprint.to_hex()
            )?;
        }
    }
    Ok(ExitCode::Success)
}

fn settings_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    explicit
        .map(Path::to_path_buf)
        .or_else(Settings::default_path)
        .ok_or(ConfigError::NoConfigDir)
}

fn run_config_show(settings: Settings, explicit: Option<&Path>) -> Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Ok(path) = settings_path(explicit) {
        writeln!(out, "# {}", path.display())?;
    }
    write!(out, "{}", toml::to_string_pretty(&settings)?)?;
    Ok(ExitCode::Success)
}

fn run_config_set(args: &ConfigSetArgs, current: Settings, explicit: Option<&Path>) -> Result<ExitCode> {
    let updated = Settings {
        hash_size: args.hash_size.unwrap_or(current.hash_size),
        hash_diff: args.hash_diff.unwrap_or(current.hash_diff),
        anim_frame: args.anim_frame.unwrap_or(current.anim_frame),
    }
    .normalized();

    if let Some(root) = &args.root {
        let cache_args = CacheArgs {
            root: root.clone(),
            cache: args.cache.clone(),
        };
        let path = cache_path(&cache_args);
        if let Some(mut store) = FingerprintStore::load_any(&path)? {
            let sampled = CacheMeta::load(&path).map(|meta| meta.anim_frame);
            let invalidation = updated.cache_invalidation(store.hash_size(), sampled);
            if invalidation != Invalidation::None {
                store.apply_invalidation(invalidation, updated.hash_size());
                store.save(&path).context("Failed to save invalidated cache")?;
            }
            record_frame(&path, updated.anim_frame);
        }
    }

    let path = settings_path(explicit)?;
    updated.save(&path)?;
    log::info!("Saved settings to {}", path.display());
    Ok(ExitCode::Success)
}
