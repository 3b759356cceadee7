//! The duplicate scanner.
//!
//! # Overview
//!
//! A scan takes a list of [`Candidate`]s and a [`FingerprintStore`] and runs
//! two phases:
//!
//! 1. **Hashing**: each candidate is stat'ed. A cached fingerprint whose
//!    mod time matches is reused; anything else is decoded and written to
//!    the store immediately. Failures are collected and the candidate is
//!    left out of the comparison.
//! 2. **Comparing**: every unordered pair of hashed candidates is checked
//!    against the threshold, in ascending `(i, j)` order.
//!
//! The cancel check is polled on a cadence during both phases. Because the
//! store is updated as fingerprints are computed, a cancelled scan loses
//! only its pair list.
//!
//! # Example
//!
//! ```no_run
//! use imgsift::cache::FingerprintStore;
//! use imgsift::compare::SimilarityComparator;
//! use imgsift::duplicates::{DuplicateScanner, ScanConfig, ScanOutcome};
//! use imgsift::fingerprint::{FingerprintCodec, HashSize};
//! use imgsift::scanner::{collect_candidates, CandidateScope};
//! use std::path::Path;
//!
//! let root = Path::new("photos");
//! let size = HashSize::default();
//! let candidates = collect_candidates(root, &CandidateScope::AllFolders)?;
//! let mut store = FingerprintStore::load(&root.join("imgSort.cache"), size)?;
//!
//! let mut scanner = DuplicateScanner::new(
//!     FingerprintCodec::new(size),
//!     SimilarityComparator::new(),
//!     ScanConfig::default().with_threshold(12),
//! );
//! if let ScanOutcome::Done(report) = scanner.scan(&candidates, &mut store) {
//!     println!("{} pairs", report.pairs.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::{DuplicatePair, FileError, ScanFailure, ScanOutcome, ScanReport, ScanState, ScanStats};
use crate::cache::FingerprintStore;
use crate::compare::{BitCounter, Counter, SimilarityComparator};
use crate::fingerprint::{DecodeError, Fingerprint, FingerprintCodec};
use crate::progress::{ProgressCallback, PHASE_COMPARING, PHASE_HASHING};
use crate::scanner::{Candidate, FileSystem, StdFileSystem};

/// Cancellation predicate. Returns true once the scan should stop.
pub type CancelCheck = dyn Fn() -> bool + Send + Sync;

/// Default time between cancel checks (1/16 s).
pub const DEFAULT_CANCEL_INTERVAL: Duration = Duration::from_micros(62_500);

/// How often the scanner calls its cancel check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCadence {
    /// At most once per interval.
    Interval(Duration),
    /// Once every `n` items (values below 1 mean every item).
    Items(usize),
}

impl Default for CancelCadence {
    fn default() -> Self {
        Self::Interval(DEFAULT_CANCEL_INTERVAL)
    }
}

/// Configuration for a scan.
#[derive(Clone)]
pub struct ScanConfig {
    /// Largest Hamming distance that still counts as a duplicate.
    pub threshold: u32,
    /// How often the cancel check runs.
    pub cadence: CancelCadence,
    /// Worker threads for hashing; `None` hashes on the caller's thread,
    /// `Some(0)` uses one thread per core.
    pub threads: Option<usize>,
    /// Optional cancellation predicate.
    pub cancel_check: Option<Arc<CancelCheck>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("threshold", &self.threshold)
            .field("cadence", &self.cadence)
            .field("threads", &self.threads)
            .field("cancel_check", &self.cancel_check.as_ref().map(|_| "<check>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold: 12,
            cadence: CancelCadence::default(),
            threads: None,
            cancel_check: None,
            progress_callback: None,
        }
    }
}

impl ScanConfig {
    /// Set the duplicate threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the cancel check cadence.
    #[must_use]
    pub fn with_cadence(mut self, cadence: CancelCadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Hash on a dedicated pool of `threads` workers (0 = one per core).
    #[must_use]
    pub fn parallel(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the cancellation predicate.
    #[must_use]
    pub fn with_cancel_check(mut self, check: Arc<CancelCheck>) -> Self {
        self.cancel_check = Some(check);
        self
    }

    /// Cancel when `flag` becomes true.
    #[must_use]
    pub fn with_shutdown_flag(self, flag: Arc<AtomicBool>) -> Self {
        self.with_cancel_check(Arc::new(move || flag.load(Ordering::SeqCst)))
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn progress(&self) -> Option<&dyn ProgressCallback> {
        self.progress_callback.as_deref()
    }
}

/// Calls the cancel check on the configured cadence.
struct CancelPoller<'a> {
    check: Option<&'a CancelCheck>,
    cadence: CancelCadence,
    last_check: Option<Instant>,
    since_check: usize,
}

impl<'a> CancelPoller<'a> {
    fn new(check: Option<&'a CancelCheck>, cadence: CancelCadence) -> Self {
        Self {
            check,
            cadence,
            last_check: None,
            since_check: 0,
        }
    }

    fn should_cancel(&mut self) -> bool {
        let Some(check) = self.check else {
            return false;
        };
        let due = match self.cadence {
            // The first poll always checks, so a pending request stops the scan early.
            CancelCadence::Interval(every) => self.last_check.is_none_or(|at| at.elapsed() >= every),
            CancelCadence::Items(n) => {
                self.since_check += 1;
                self.since_check >= n.max(1)
            }
        };
        if !due {
            return false;
        }
        self.last_check = Some(Instant::now());
        self.since_check = 0;
        check()
    }
}

/// What the cache says about a candidate before any decoding.
enum Lookup {
    Hit(Fingerprint),
    Miss(u32),
    Failed(FileError),
}

/// Fingerprints gathered during the Hashing phase, indexed by candidate.
struct Hashed {
    fingerprints: Vec<Option<Fingerprint>>,
    failures: Vec<ScanFailure>,
    stats: ScanStats,
}

impl Hashed {
    fn new(candidates: usize) -> Self {
        Self {
            fingerprints: vec![None; candidates],
            failures: Vec::new(),
            stats: ScanStats {
                candidates,
                ..ScanStats::default()
            },
        }
    }

    fn fail(&mut self, candidate: &Candidate, error: FileError) {
        log::debug!("Skipping {}: {}", candidate.key, error);
        self.stats.failed += 1;
        self.failures.push(ScanFailure {
            key: candidate.key.clone(),
            path: candidate.path.clone(),
            error,
        });
    }
}

/// Finds near-duplicate pairs among a candidate set.
pub struct DuplicateScanner<C = Counter> {
    codec: FingerprintCodec,
    comparator: SimilarityComparator<C>,
    fs: Arc<dyn FileSystem>,
    config: ScanConfig,
    state: ScanState,
}

impl<C: BitCounter> std::fmt::Debug for DuplicateScanner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateScanner")
            .field("codec", &self.codec)
            .field("counter", &self.comparator.counter().name())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: BitCounter> DuplicateScanner<C> {
    /// Create a scanner that reads modification times from disk.
    #[must_use]
    pub fn new(codec: FingerprintCodec, comparator: SimilarityComparator<C>, config: ScanConfig) -> Self {
        Self {
            codec,
            comparator,
            fs: Arc::new(StdFileSystem),
            config,
            state: ScanState::Idle,
        }
    }

    /// Use a different source of modification times.
    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// The scan configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `candidates`, reading and updating `store`.
    ///
    /// A store built for a different hash size than the codec's is cleared
    /// and switched to the codec's hash size first.
    pub fn scan(&mut self, candidates: &[Candidate], store: &mut FingerprintStore) -> ScanOutcome {
        if store.hash_size() != self.codec.hash_size() {
            log::warn!(
                "Cache holds hash size {}, scanning with {}; discarding {} entries",
                store.hash_size(),
                self.codec.hash_size(),
                store.len()
            );
            store.reset(self.codec.hash_size());
        }

        self.state = ScanState::Hashing;
        log::info!("Fingerprinting {} candidates", candidates.len());
        let hashed = match self.config.threads {
            Some(threads) => self.hash_parallel(candidates, store, threads),
            None => self.hash_sequential(candidates, store),
        };
        let hashed = match hashed {
            Ok(hashed) => hashed,
            Err(stats) => return self.cancelled(stats),
        };
        log::info!(
            "Fingerprinted {} of {} candidates ({} cached, {} computed, {} failed)",
            hashed.stats.hashed,
            candidates.len(),
            hashed.stats.cache_hits,
            hashed.stats.cache_misses,
            hashed.stats.failed
        );

        self.state = ScanState::Comparing;
        let Hashed {
            fingerprints,
            failures,
            mut stats,
        } = hashed;
        let pairs = match self.compare(candidates, &fingerprints, &mut stats) {
            Some(pairs) => pairs,
            None => return self.cancelled(stats),
        };

        self.state = ScanState::Done;
        log::info!(
            "Found {} duplicate pairs in {} comparisons",
            pairs.len(),
            stats.comparisons
        );
        ScanOutcome::Done(ScanReport {
            pairs,
            failures,
            stats,
        })
    }

    fn cancelled(&mut self, stats: ScanStats) -> ScanOutcome {
        log::info!("Scan cancelled during {}", self.state);
        self.state = ScanState::Cancelled;
        ScanOutcome::Cancelled(stats)
    }

    fn lookup(&self, candidate: &Candidate, store: &mut FingerprintStore) -> Lookup {
        let mod_time = match self.fs.mod_time(&candidate.path) {
            Ok(mod_time) => mod_time,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                store.delete(&candidate.key);
                return Lookup::Failed(FileError::Missing);
            }
            Err(e) => return Lookup::Failed(FileError::Stat(e)),
        };

        match store.get(&candidate.key) {
            Some(entry) if entry.is_fresh(mod_time) => {
                log::trace!("Cache hit: {}", candidate.key);
                Lookup::Hit(entry.fingerprint.clone())
            }
            Some(_) => {
                log::debug!("Cache stale: {}", candidate.key);
                Lookup::Miss(mod_time)
            }
            None => {
                log::trace!("Cache miss: {}", candidate.key);
                Lookup::Miss(mod_time)
            }
        }
    }

    fn record(
        &self,
        index: usize,
        candidate: &Candidate,
        mod_time: u32,
        computed: Result<Fingerprint, DecodeError>,
        store: &mut FingerprintStore,
        hashed: &mut Hashed,
    ) {
        let fingerprint = match computed {
            Ok(fingerprint) => fingerprint,
            Err(e) => return hashed.fail(candidate, FileError::Decode(e.cause)),
        };
        if let Err(e) = store.put(&candidate.key, fingerprint.clone(), mod_time) {
            return hashed.fail(candidate, FileError::Store(e));
        }
        hashed.stats.cache_misses += 1;
        hashed.stats.hashed += 1;
        hashed.fingerprints[index] = Some(fingerprint);
    }

    fn hash_sequential(
        &self,
        candidates: &[Candidate],
        store: &mut FingerprintStore,
    ) -> Result<Hashed, ScanStats> {
        let progress = self.config.progress();
        let mut poller = CancelPoller::new(self.config.cancel_check.as_deref(), self.config.cadence);
        let mut hashed = Hashed::new(candidates.len());

        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_HASHING, candidates.len());
        }
        for (index, candidate) in candidates.iter().enumerate() {
            if poller.should_cancel() {
                if let Some(cb) = progress {
                    cb.on_phase_end(PHASE_HASHING);
                }
                return Err(hashed.stats);
            }
            if let Some(cb) = progress {
                cb.on_progress(index + 1, &candidate.key);
            }

            match self.lookup(candidate, store) {
                Lookup::Hit(fingerprint) => {
                    hashed.stats.cache_hits += 1;
                    hashed.stats.hashed += 1;
                    hashed.fingerprints[index] = Some(fingerprint);
                }
                Lookup::Miss(mod_time) => {
                    let computed = self.codec.compute(&candidate.path);
                    self.record(index, candidate, mod_time, computed, store, &mut hashed);
                }
                Lookup::Failed(error) => hashed.fail(candidate, error),
            }
        }
        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_HASHING);
        }
        Ok(hashed)
    }

    /// Cache lookups on the caller's thread, decoding on a rayon pool, then
    /// a single-threaded merge into the store.
    fn hash_parallel(
        &self,
        candidates: &[Candidate],
        store: &mut FingerprintStore,
        threads: usize,
    ) -> Result<Hashed, ScanStats> {
        let progress = self.config.progress();
        let check = self.config.cancel_check.as_deref();
        let mut poller = CancelPoller::new(check, self.config.cadence);
        let mut hashed = Hashed::new(candidates.len());

        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_HASHING, candidates.len());
        }

        let mut misses: Vec<(usize, u32)> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if poller.should_cancel() {
                if let Some(cb) = progress {
                    cb.on_phase_end(PHASE_HASHING);
                }
                return Err(hashed.stats);
            }
            match self.lookup(candidate, store) {
                Lookup::Hit(fingerprint) => {
                    hashed.stats.cache_hits += 1;
                    hashed.stats.hashed += 1;
                    hashed.fingerprints[index] = Some(fingerprint);
                }
                Lookup::Miss(mod_time) => misses.push((index, mod_time)),
                Lookup::Failed(error) => hashed.fail(candidate, error),
            }
        }
        log::debug!(
            "Decoding {} uncached candidates on {} threads",
            misses.len(),
            if threads == 0 { rayon::current_num_threads() } else { threads }
        );

        let cancelled = AtomicBool::new(false);
        let done = std::sync::atomic::AtomicUsize::new(hashed.stats.cache_hits + hashed.stats.failed);
        let codec = &self.codec;
        let results: Vec<Option<Result<Fingerprint, DecodeError>>> = run_in_pool(threads, || {
            misses
                .par_iter()
                .map(|&(index, _)| {
                    if cancelled.load(Ordering::Relaxed) || check.is_some_and(|c| c()) {
                        cancelled.store(true, Ordering::Relaxed);
                        return None;
                    }
                    let candidate = &candidates[index];
                    let result = codec.compute(&candidate.path);
                    if let Some(cb) = progress {
                        cb.on_progress(done.fetch_add(1, Ordering::Relaxed) + 1, &candidate.key);
                    }
                    Some(result)
                })
                .collect()
        });

        // Completed work is kept even when cancelled.
        for (&(index, mod_time), result) in misses.iter().zip(results) {
            if let Some(computed) = result {
                self.record(index, &candidates[index], mod_time, computed, store, &mut hashed);
            }
        }
        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_HASHING);
        }

        if cancelled.load(Ordering::Relaxed) {
            Err(hashed.stats)
        } else {
            Ok(hashed)
        }
    }

    /// Compare every pair of hashed candidates. `None` when cancelled.
    fn compare(
        &self,
        candidates: &[Candidate],
        fingerprints: &[Option<Fingerprint>],
        stats: &mut ScanStats,
    ) -> Option<Vec<DuplicatePair>> {
        let hashed: Vec<(usize, &Fingerprint)> = fingerprints
            .iter()
            .enumerate()
            .filter_map(|(index, fp)| fp.as_ref().map(|fp| (index, fp)))
            .collect();
        if hashed.len() < 2 {
            log::debug!("Fewer than two fingerprints, nothing to compare");
            return Some(Vec::new());
        }

        let progress = self.config.progress();
        let mut poller = CancelPoller::new(self.config.cancel_check.as_deref(), self.config.cadence);
        let threshold = self.config.threshold;
        let mut pairs = Vec::new();

        if let Some(cb) = progress {
            cb.on_phase_start(PHASE_COMPARING, hashed.len() - 1);
        }
        for (row, &(i, a)) in hashed.iter().enumerate().take(hashed.len() - 1) {
            if poller.should_cancel() {
                if let Some(cb) = progress {
                    cb.on_phase_end(PHASE_COMPARING);
                }
                return None;
            }
            if let Some(cb) = progress {
                cb.on_progress(row + 1, &candidates[i].key);
            }
            for &(j, b) in &hashed[row + 1..] {
                stats.comparisons += 1;
                if let Some(distance) = self.comparator.within(a.as_bytes(), b.as_bytes(), threshold) {
                    log::debug!(
                        "Duplicate: {} <-> {} (distance {})",
                        candidates[i].key,
                        candidates[j].key,
                        distance
                    );
                    pairs.push(DuplicatePair {
                        first: candidates[i].key.clone(),
                        second: candidates[j].key.clone(),
                        first_index: i,
                        second_index: j,
                        distance,
                    });
                }
            }
        }
        if let Some(cb) = progress {
            cb.on_phase_end(PHASE_COMPARING);
        }
        Some(pairs)
    }
}

/// Run `op` on a pool of `threads` workers, or the global pool if one
/// cannot be built.
fn run_in_pool<R: Send>(threads: usize, op: impl FnOnce() -> R + Send) -> R {
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(op),
        Err(e) => {
            log::warn!(
                "Failed to create thread pool ({}), using global pool with {} threads",
                e,
                rayon::current_num_threads()
            );
            op()
        }
    }
}
