//! dupescan - resumable duplicate file scanner
//!
//! Walks registered directory trees into a persistent SQLite catalog,
//! fingerprints every file with a bounded pool of hash workers, and groups
//! the catalog into duplicate sets. Interrupted scans resume from their
//! checkpoint without re-hashing files whose size and mtime are unchanged.

pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::catalog::{Catalog, RootFolder, VerifyReport};
use crate::cli::{Cli, Commands, DuplicatesArgs, RegisterArgs, ScanArgs};
use crate::config::{Config, Overrides};
use crate::duplicates::{DuplicateDetector, DuplicateQuery, DuplicateReport};
use crate::error::ExitCode;
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::path_utils::absolute_root;
use crate::scanner::{ensure_directory, ScanOptions, ScanSummary, Scanner};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid configuration, catalog failures, and
/// interrupted scans. Use [`ExitCode::for_error`] to map it to an exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let overrides = overrides_for(&cli);
    let config = Config::load(cli.config.as_deref(), &overrides).context("Failed to load configuration")?;
    log::debug!("Effective configuration: {config:?}");

    let db_path = config.database_path()?;
    let catalog = Arc::new(
        Catalog::open(&db_path).with_context(|| format!("Failed to open catalog {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Register(args) => register(&catalog, &config, &args),
        Commands::Deregister(args) => {
            let root = catalog.deregister_root(&resolve(&args.path)?)?;
            println!("Deregistered {}", root.path);
            Ok(ExitCode::Success)
        }
        Commands::Scan(args) => scan(catalog, &config, &args, cli.quiet),
        Commands::Duplicates(args) => duplicates(catalog, &args),
        Commands::Refresh(args) => {
            let root = registered_root(&catalog, &args.path)?;
            let stats = catalog.refresh_root_stats(root.id)?;
            println!(
                "{}: {} folders, {} files, {}",
                root.path,
                stats.folder_count,
                stats.file_count,
                ByteSize::b(stats.total_size)
            );
            Ok(ExitCode::Success)
        }
        Commands::Purge(args) => {
            let root = registered_root(&catalog, &args.path)?;
            let purged = catalog.purge_removed(root.id)?;
            println!(
                "Purged {} removed folders and {} removed files from {}",
                purged.folders, purged.files, root.path
            );
            Ok(ExitCode::Success)
        }
        Commands::Verify(args) => {
            let report = catalog.verify(args.repair)?;
            print_verify(&report)?;
            Ok(if report.is_clean() {
                ExitCode::Success
            } else {
                ExitCode::PartialSuccess
            })
        }
        Commands::Roots => {
            print_roots(&catalog.list_roots()?)?;
            Ok(ExitCode::Success)
        }
    }
}

fn overrides_for(cli: &Cli) -> Overrides {
    let mut overrides = Overrides {
        database_path: cli.database.clone(),
        ..Overrides::default()
    };
    if let Commands::Scan(args) = &cli.command {
        overrides.workers = args.workers;
        overrides.hash_algorithm.clone_from(&args.algorithm);
    }
    overrides
}

fn resolve(path: &Path) -> Result<std::path::PathBuf> {
    absolute_root(path).with_context(|| format!("Failed to resolve {}", path.display()))
}

fn registered_root(catalog: &Catalog, path: &Path) -> Result<RootFolder> {
    let resolved = resolve(path)?;
    catalog
        .get_root_by_path(&resolved)?
        .with_context(|| format!("Root folder not registered: {}", resolved.display()))
}

fn register(catalog: &Catalog, config: &Config, args: &RegisterArgs) -> Result<ExitCode> {
    let path = resolve(&args.path)?;
    ensure_directory(&path)?;
    let root = catalog.register_root(&path, args.traverse_links || config.traverse_links)?;
    println!(
        "Registered {} (traverse links: {})",
        root.path,
        if root.traverse_links { "yes" } else { "no" }
    );
    Ok(ExitCode::Success)
}

fn scan(catalog: Arc<Catalog>, config: &Config, args: &ScanArgs, quiet: bool) -> Result<ExitCode> {
    let options = ScanOptions {
        mode: args.mode,
        algorithm: config.algorithm()?,
        pool: config.pool_config(),
    };
    let handler = signal::install_handler(config.shutdown_grace())?;
    let progress: Arc<dyn ProgressCallback> =
        Arc::new(Progress::new(quiet).with_tick_interval(config.progress_interval()));

    let mut scanner = Scanner::new(catalog, &args.path, options)?
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress);

    let summary = scanner
        .scan(args.restart)
        .with_context(|| format!("Scan of {} stopped", scanner.root().path))?;

    if !quiet {
        print_summary(&summary)?;
    }
    Ok(if summary.has_errors() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn duplicates(catalog: Arc<Catalog>, args: &DuplicatesArgs) -> Result<ExitCode> {
    let mut query = DuplicateQuery::default()
        .with_min_count(usize::try_from(args.min_count).unwrap_or(usize::MAX))
        .with_min_size(args.min_size)
        .with_sort(args.sort);
    if let Some(root) = &args.root {
        query = query.with_root(root.clone());
    }

    let report = DuplicateDetector::new(catalog).find_duplicates(&query)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        print_duplicates(&report)?;
    }

    Ok(if report.sets.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

fn print_summary(summary: &ScanSummary) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "Scanned {} ({}): {} folders, {} files, {} hashed in {:.1}s",
        summary.root,
        summary.mode,
        summary.folders,
        summary.files,
        summary.files_hashed,
        summary.duration.as_secs_f64()
    )?;
    if summary.resumed {
        writeln!(out, "Resumed from an unfinished checkpoint")?;
    }
    if summary.removed > 0 {
        writeln!(out, "{} entries no longer on disk were flagged removed", summary.removed)?;
    }
    if summary.has_errors() {
        writeln!(
            out,
            "Errors: {} folders, {} files ({} hash failures)",
            summary.folder_errors, summary.file_errors, summary.hash_failures
        )?;
    }
    Ok(())
}

fn print_duplicates(report: &DuplicateReport) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for set in &report.sets {
        writeln!(
            out,
            "{} x {} [{}:{}]",
            set.len(),
            ByteSize::b(set.size),
            set.algorithm,
            set.fingerprint
        )?;
        for member in &set.members {
            writeln!(out, "  {}", member.path)?;
            for alias in &member.aliases {
                writeln!(out, "    = {alias}")?;
            }
        }
    }
    let stats = &report.stats;
    writeln!(
        out,
        "{} duplicate sets, {} files, {} total, {} recoverable",
        stats.total_sets,
        stats.total_files,
        ByteSize::b(stats.total_bytes),
        ByteSize::b(stats.recoverable_bytes)
    )
}

fn print_verify(report: &VerifyReport) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for check in &report.checks {
        let status = if check.issues == 0 { "ok" } else { "FAIL" };
        writeln!(
            out,
            "{status:<4} {:<20} issues: {} repaired: {}",
            check.name, check.issues, check.repaired
        )?;
        for detail in &check.details {
            writeln!(out, "       {detail}")?;
        }
    }
    writeln!(
        out,
        "{} issues found, {} outstanding",
        report.total_issues(),
        report.outstanding()
    )
}

fn print_roots(roots: &[RootFolder]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if roots.is_empty() {
        return writeln!(out, "No roots registered");
    }
    for root in roots {
        let last_scan = root
            .last_scan_at
            .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M:%S").to_string());
        writeln!(
            out,
            "{}  folders: {}  files: {}  size: {}  last scan: {}",
            root.path,
            root.folder_count,
            root.file_count,
            ByteSize::b(root.total_size),
            last_scan
        )?;
    }
    Ok(())
}
