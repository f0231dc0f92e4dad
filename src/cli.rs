//! Command-line interface definitions for dupescan.
//!
//! # Example
//!
//! ```bash
//! # Register a tree and scan it
//! dupescan register ~/Pictures
//! dupescan scan all ~/Pictures
//!
//! # Resume after Ctrl+C (just run the same scan again)
//! dupescan scan all ~/Pictures
//!
//! # List duplicate sets of at least 1 MB as JSON
//! dupescan duplicates --min-size 1MB --json
//! ```

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::checkpoint::ScanMode;
use crate::duplicates::SortOrder;

/// Resumable duplicate file scanner backed by a persistent catalog.
#[derive(Debug, Parser)]
#[command(name = "dupescan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: config.toml in the platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, value_name = "FILE", global = true, env = "DUPESCAN_DATABASE")]
    pub database: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a directory tree as a scan root
    Register(RegisterArgs),
    /// Remove a root and everything cataloged under it
    Deregister(RootArgs),
    /// Scan a registered root
    Scan(ScanArgs),
    /// List duplicate sets from the catalog
    Duplicates(DuplicatesArgs),
    /// Recompute a root's folder, file and size totals
    Refresh(RootArgs),
    /// Delete catalog rows flagged as removed under a root
    Purge(RootArgs),
    /// Check catalog consistency
    Verify(VerifyArgs),
    /// List registered roots
    Roots,
}

/// Arguments for the register subcommand.
#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Directory to register
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Descend into directories reached through symbolic links
    #[arg(long)]
    pub traverse_links: bool,
}

/// A subcommand that takes a registered root.
#[derive(Debug, Args)]
pub struct RootArgs {
    /// Registered root directory
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Phases to run
    #[arg(value_enum, value_name = "MODE")]
    pub mode: ScanMode,

    /// Registered root directory
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Discard any unfinished checkpoint and start over
    #[arg(long)]
    pub restart: bool,

    /// Number of hash workers (default: CPU count)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Fingerprint algorithm: sha256, sha512, sha3-256 or blake3
    #[arg(long, value_name = "ALGORITHM")]
    pub algorithm: Option<String>,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Minimum number of copies per set
    #[arg(long, value_name = "N", default_value_t = 2, value_parser = clap::value_parser!(u64).range(2..))]
    pub min_count: u64,

    /// Minimum file size (e.g., 1KB, 1MB, 1GiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size, default_value = "0")]
    pub min_size: u64,

    /// Only report files under this registered root
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Ordering of the sets
    #[arg(long, value_enum, default_value_t = SortOrder::Size)]
    pub sort: SortOrder,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the verify subcommand.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Apply safe fixes for the issues found
    #[arg(long)]
    pub repair: bool,
}

/// Parse a human-readable size such as `10`, `1KB`, `1.5MiB` into bytes.
///
/// Decimal suffixes (KB, MB, ...) are powers of 1000, binary suffixes (KiB,
/// MiB, ...) powers of 1024.
///
/// # Errors
///
/// Returns a message suitable for clap when the input is not a size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }
    s.parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
