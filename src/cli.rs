//! Command-line interface definitions for imgsift.
//!
//! # Example
//!
//! ```bash
//! # Compare every image one folder deep under ~/Pictures
//! imgsift scan ~/Pictures
//!
//! # Only the "holiday" folder, reporting pairs as JSON
//! imgsift scan ~/Pictures --folder holiday --output json
//!
//! # Drop cache entries for deleted or edited files
//! imgsift prune ~/Pictures
//!
//! # Use finer fingerprints from now on (invalidates the cache)
//! imgsift config set --hash-size 16 --root ~/Pictures
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Find near-duplicate images and videos.
///
/// imgsift fingerprints every image with a difference hash, caches the
/// fingerprints next to the collection, and reports pairs whose
/// fingerprints differ in at most a threshold number of bits.
#[derive(Debug, Parser)]
#[command(name = "imgsift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Settings file (default: platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find near-duplicate pairs in a collection
    Scan(ScanArgs),
    /// Remove cache entries for missing or modified files
    Prune(CacheArgs),
    /// List the contents of a collection's cache
    Inspect(InspectArgs),
    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Collection root
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Scan only this folder (relative to ROOT, "." for ROOT itself)
    ///
    /// Without this, every file one level inside every sub-folder is
    /// scanned, except in "Trash" and folders starting with "." or "$".
    #[arg(long, value_name = "NAME")]
    pub folder: Option<PathBuf>,

    /// Fingerprint cache file (default: ROOT/imgSort.cache)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Largest Hamming distance reported as a duplicate (overrides hash_diff)
    #[arg(short, long, value_name = "BITS")]
    pub threshold: Option<u16>,

    /// dHash grid size, a multiple of 4 from 4 to 32 (overrides hash_size)
    #[arg(long, value_name = "N")]
    pub hash_size: Option<u8>,

    /// Frame sampled from GIFs and videos (overrides anim_frame)
    #[arg(long, value_name = "INDEX")]
    pub anim_frame: Option<u16>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Where to list files that could not be decoded (default: ROOT/failed.txt)
    #[arg(long, value_name = "PATH")]
    pub failed_list: Option<PathBuf>,

    /// Decode uncached files on several threads
    #[arg(long)]
    pub parallel: bool,

    /// Worker threads for --parallel (default: one per core)
    #[arg(long, value_name = "N", requires = "parallel")]
    pub threads: Option<usize>,
}

/// Arguments naming a collection's cache.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Collection root
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Fingerprint cache file (default: ROOT/imgSort.cache)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,
}

/// Arguments for the inspect subcommand.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Cache to read
    #[command(flatten)]
    pub cache: CacheArgs,

    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,
}

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings
    Show,
    /// Change settings and update a collection's cache to match
    Set(ConfigSetArgs),
}

/// Arguments for `config set`.
#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    /// New dHash grid size
    #[arg(long, value_name = "N")]
    pub hash_size: Option<u8>,

    /// New duplicate threshold
    #[arg(long, value_name = "BITS")]
    pub hash_diff: Option<u16>,

    /// New sampled frame
    #[arg(long, value_name = "INDEX")]
    pub anim_frame: Option<u16>,

    /// Collection whose cache should be invalidated by the change
    #[arg(long, value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Cache file to invalidate (default: ROOT/imgSort.cache)
    #[arg(long, value_name = "PATH", requires = "root")]
    pub cache: Option<PathBuf>,
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per pair
    Text,
    /// JSON document for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
