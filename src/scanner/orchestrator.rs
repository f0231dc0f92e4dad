//! Resumable scans of one registered root.
//!
//! # Overview
//!
//! A [`Scanner`] runs one of three [`ScanMode`]s against a root:
//!
//! * `all`: traverse the tree, register folders and files, and fingerprint
//!   new or changed files in the same pass.
//! * `folders`: traverse and register folders only.
//! * `files`: skip traversal; re-list every cataloged folder and fingerprint
//!   whatever has no fingerprint yet.
//!
//! Files are always registered before they are queued for hashing, so every
//! fingerprint write lands on an existing row. The checkpoint is saved after
//! each folder. A resumed scan walks the tree again from the root; already
//! cataloged entries are cheap upserts and keep their fingerprints.
//!
//! Per-file and per-folder errors are recorded on the affected rows and never
//! stop the scan. Catalog failures and cancellation stop it and leave the
//! checkpoint interrupted.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::catalog::{Catalog, CatalogError, FolderRecord, NewFile, RootFolder};
use crate::checkpoint::{CheckpointError, CheckpointManager, ScanMode};
use crate::pool::{PoolConfig, PoolError, WorkerPool};
use crate::progress::{ProgressCallback, ScanCounters, PHASE_HASH, PHASE_TRAVERSE};

use super::jobs::HashJob;
use super::path_utils::{absolute_root, fs_path, is_within, storage_path};
use super::{FolderDescriptor, HashAlgorithm, Hasher, Walker, WalkerConfig};

/// Errors that stop a scan.
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    /// The path is not a registered root.
    #[error("Root folder not registered: {0}")]
    RootNotRegistered(PathBuf),

    /// The root path could not be resolved.
    #[error("Invalid root path {path}: {source}")]
    InvalidRoot {
        /// Path as given
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A files-only scan found nothing to re-list.
    #[error("No cataloged folders under {0}; run a folders or all scan first")]
    NoFolders(String),

    /// Shutdown was requested.
    #[error("Scan interrupted")]
    Interrupted,

    /// The checkpoint could not be started or advanced.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A catalog write failed on the scan thread.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Hash workers failed to store results.
    #[error("{count} fingerprint writes failed; first: {first}")]
    StoreFailures {
        /// Number of failed jobs
        count: usize,
        /// The first failure message
        first: String,
    },
}

/// What a scan runs and with which resources.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Scan mode
    pub mode: ScanMode,
    /// Fingerprint algorithm for newly hashed files
    pub algorithm: HashAlgorithm,
    /// Hash worker pool sizing
    pub pool: PoolConfig,
}

/// Outcome of one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Root path
    pub root: String,
    /// Scan mode
    pub mode: ScanMode,
    /// Folders registered or re-listed
    pub folders: u64,
    /// Files registered
    pub files: u64,
    /// Files fingerprinted in this run
    pub files_hashed: u64,
    /// Files whose hashing failed
    pub hash_failures: u64,
    /// Folders that could not be listed
    pub folder_errors: u64,
    /// Files with a recorded error
    pub file_errors: u64,
    /// Folders and files newly flagged as removed
    pub removed: u64,
    /// Wall time
    pub duration: Duration,
    /// The scan continued an interrupted checkpoint
    pub resumed: bool,
    /// The scan stopped before finishing
    pub interrupted: bool,
}

impl ScanSummary {
    /// Returns `true` if any folder or file was recorded with an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.folder_errors > 0 || self.file_errors > 0
    }
}

/// Scanner for one registered root.
pub struct Scanner {
    catalog: Arc<Catalog>,
    root: RootFolder,
    options: ScanOptions,
    shutdown_flag: Arc<AtomicBool>,
    progress: Option<Arc<dyn ProgressCallback>>,
    summary: Option<ScanSummary>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("root", &self.root.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Create a scanner for the root registered at `root_path`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RootNotRegistered`] if the path is not a
    /// registered root.
    pub fn new(
        catalog: Arc<Catalog>,
        root_path: &Path,
        options: ScanOptions,
    ) -> Result<Self, OrchestratorError> {
        let resolved = absolute_root(root_path).map_err(|source| OrchestratorError::InvalidRoot {
            path: root_path.to_path_buf(),
            source,
        })?;
        let root = catalog
            .get_root_by_path(&resolved)?
            .ok_or(OrchestratorError::RootNotRegistered(resolved))?;

        Ok(Self {
            catalog,
            root,
            options,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
            summary: None,
        })
    }

    /// Share a shutdown flag with the caller's signal handler.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Report progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// The root being scanned.
    #[must_use]
    pub fn root(&self) -> &RootFolder {
        &self.root
    }

    /// Summary of the most recent run, including failed ones.
    #[must_use]
    pub fn summary(&self) -> Option<&ScanSummary> {
        self.summary.as_ref()
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Run the configured scan.
    ///
    /// With `restart`, existing checkpoints for this root and mode are
    /// discarded first; otherwise an active checkpoint is resumed.
    ///
    /// Root statistics are refreshed whether or not the scan succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Interrupted`] on cancellation and the
    /// underlying error when a catalog write fails. In both cases the
    /// checkpoint is left interrupted.
    pub fn scan(&mut self, restart: bool) -> Result<ScanSummary, OrchestratorError> {
        let started = Instant::now();
        let mode = self.options.mode;
        let counters = Arc::new(ScanCounters::default());
        let mut checkpoint = CheckpointManager::new(Arc::clone(&self.catalog), self.root.id, mode);

        let resumed = if restart {
            checkpoint.clear()?;
            checkpoint.start()?;
            false
        } else if checkpoint.resume()?.is_some() {
            true
        } else {
            checkpoint.start()?;
            false
        };

        log::info!("Starting {} scan of {}", mode, self.root.path);

        let mut removed = 0;
        let result = match mode {
            ScanMode::All => self.run_traversal(&mut checkpoint, &counters, true, &mut removed),
            ScanMode::Folders => self.run_traversal(&mut checkpoint, &counters, false, &mut removed),
            ScanMode::Files => self.run_files(&mut checkpoint, &counters, &mut removed),
        };

        let stats = self.catalog.refresh_root_stats(self.root.id);

        let mut summary = ScanSummary {
            root: self.root.path.clone(),
            mode,
            folders: ScanCounters::get(&counters.folders),
            files: ScanCounters::get(&counters.files),
            files_hashed: ScanCounters::get(&counters.files_hashed),
            hash_failures: ScanCounters::get(&counters.hash_failures),
            folder_errors: ScanCounters::get(&counters.folder_errors),
            file_errors: ScanCounters::get(&counters.file_errors),
            removed,
            duration: started.elapsed(),
            resumed,
            interrupted: false,
        };

        if let (Err(_), Err(e)) = (&result, &stats) {
            log::warn!("Failed to refresh statistics for {}: {}", self.root.path, e);
        }
        let outcome = result
            .and_then(|()| stats.map_err(OrchestratorError::from))
            .and_then(|_| checkpoint.complete().map_err(OrchestratorError::from));

        match outcome {
            Ok(_) => {
                log::info!(
                    "Scan of {} finished: {} folders, {} files, {} hashed in {:.2?}",
                    summary.root,
                    summary.folders,
                    summary.files,
                    summary.files_hashed,
                    summary.duration
                );
                self.summary = Some(summary.clone());
                Ok(summary)
            }
            Err(e) => {
                if let Err(flush) = checkpoint.interrupt() {
                    log::error!("Failed to save checkpoint as interrupted: {}", flush);
                }
                summary.interrupted = true;
                self.summary = Some(summary);
                Err(e)
            }
        }
    }

    fn start_pool(&self) -> Result<WorkerPool<HashJob>, OrchestratorError> {
        let pool = WorkerPool::new(self.options.pool.clone(), Arc::clone(&self.shutdown_flag))?;
        log::debug!(
            "Hashing with {} on {} workers",
            self.options.algorithm,
            pool.workers()
        );
        if let Some(progress) = &self.progress {
            progress.on_phase_start(PHASE_HASH, 0);
        }
        Ok(pool)
    }

    /// Wait for queued hashing. Panicked jobs count as hash failures; any
    /// other failure is a catalog write that did not happen.
    fn drain_pool(&self, pool: WorkerPool<HashJob>, counters: &ScanCounters) -> Result<(), OrchestratorError> {
        let report = pool.wait();
        if let Some(progress) = &self.progress {
            progress.on_phase_end(PHASE_HASH);
        }
        if report.dropped > 0 {
            log::info!("{} queued files left unhashed", report.dropped);
        }

        let mut store_failures = Vec::new();
        for failure in report.errors {
            if failure.panicked {
                ScanCounters::bump(&counters.hash_failures);
            } else {
                store_failures.push(failure);
            }
        }
        if let Some(first) = store_failures.first() {
            return Err(OrchestratorError::StoreFailures {
                count: store_failures.len(),
                first: format!("{}: {}", first.job_id, first.message),
            });
        }
        if self.is_cancelled() {
            return Err(OrchestratorError::Interrupted);
        }
        Ok(())
    }

    fn run_traversal(
        &self,
        checkpoint: &mut CheckpointManager,
        counters: &Arc<ScanCounters>,
        hash: bool,
        removed: &mut u64,
    ) -> Result<(), OrchestratorError> {
        if self.is_cancelled() {
            return Err(OrchestratorError::Interrupted);
        }
        let pool = if hash { Some(self.start_pool()?) } else { None };
        let traversal = self.traverse(checkpoint, counters, pool.as_ref(), removed);
        let drained = pool.map(|pool| self.drain_pool(pool, counters));
        traversal?;
        drained.unwrap_or(Ok(()))
    }

    fn traverse(
        &self,
        checkpoint: &mut CheckpointManager,
        counters: &Arc<ScanCounters>,
        pool: Option<&WorkerPool<HashJob>>,
        removed: &mut u64,
    ) -> Result<(), OrchestratorError> {
        let root_path = fs_path(&self.root.path);
        let walker = Walker::new(&root_path, WalkerConfig::new(self.root.traverse_links))
        .with_shutdown_flag(Arc::clone(&self.shutdown_flag));
        let hasher = Arc::new(self.hasher());

        if let Some(progress) = &self.progress {
            progress.on_phase_start(PHASE_TRAVERSE, 0);
        }

        let mut seen = HashSet::new();
        let mut errored = Vec::new();
        let mut walk = walker.walk();
        for folder in walk.by_ref() {
            if self.is_cancelled() {
                return Err(OrchestratorError::Interrupted);
            }
            let folder_id = self.register_folder(&folder, counters)?;
            seen.insert(folder_id);
            if folder.is_errored() {
                errored.push(folder.path.clone());
            } else if let Some(pool) = pool {
                *removed += self.register_files(folder_id, &folder, counters, pool, &hasher)?;
            }
            self.advance(checkpoint, counters, &folder.path)?;
        }

        if let Some(progress) = &self.progress {
            progress.on_phase_end(PHASE_TRAVERSE);
        }
        if walk.was_interrupted() || self.is_cancelled() {
            return Err(OrchestratorError::Interrupted);
        }

        if errored.contains(&root_path) {
            log::warn!("Root {} could not be read; nothing flagged removed", self.root.path);
            return Ok(());
        }
        // Folders below an unreadable folder were not visited, not deleted
        if !errored.is_empty() {
            for record in self.catalog.list_folders(self.root.id, false)? {
                if errored.iter().any(|e| is_within(&fs_path(&record.path), e)) {
                    seen.insert(record.id);
                }
            }
        }
        let gone = self.catalog.mark_unseen_folders_removed(self.root.id, &seen)?;
        if gone > 0 {
            log::info!("{} folders no longer exist under {}", gone, self.root.path);
        }
        *removed += gone;
        Ok(())
    }

    fn run_files(
        &self,
        checkpoint: &mut CheckpointManager,
        counters: &Arc<ScanCounters>,
        removed: &mut u64,
    ) -> Result<(), OrchestratorError> {
        let folders = self.catalog.list_folders(self.root.id, false)?;
        if folders.is_empty() {
            return Err(OrchestratorError::NoFolders(self.root.path.clone()));
        }
        if self.is_cancelled() {
            return Err(OrchestratorError::Interrupted);
        }

        let pool = self.start_pool()?;
        let listing = self.relist_folders(&folders, checkpoint, counters, &pool, removed);
        let drained = self.drain_pool(pool, counters);
        listing?;
        drained
    }

    fn relist_folders(
        &self,
        folders: &[FolderRecord],
        checkpoint: &mut CheckpointManager,
        counters: &Arc<ScanCounters>,
        pool: &WorkerPool<HashJob>,
        removed: &mut u64,
    ) -> Result<(), OrchestratorError> {
        let hasher = Arc::new(self.hasher());
        let config = WalkerConfig::new(self.root.traverse_links);

        if let Some(progress) = &self.progress {
            progress.on_phase_start(PHASE_TRAVERSE, folders.len());
        }

        for record in folders {
            if self.is_cancelled() {
                return Err(OrchestratorError::Interrupted);
            }
            let path = fs_path(&record.path);
            let listing = Walker::new(&path, config.clone()).list_folder();

            match &listing.error {
                Some(_) if !path_exists(&path) => {
                    log::info!("Folder {} no longer exists", record.path);
                    self.catalog.mark_folder_removed(record.id)?;
                    *removed += 1;
                }
                Some(error) => {
                    log::warn!("Cannot read folder {}: {}", record.path, error);
                    self.catalog.set_folder_error(record.id, Some(error))?;
                    ScanCounters::bump(&counters.folder_errors);
                }
                None => {
                    if record.error_status.is_some() {
                        self.catalog.set_folder_error(record.id, None)?;
                    }
                    *removed += self.register_files(record.id, &listing, counters, pool, &hasher)?;
                }
            }
            self.advance(checkpoint, counters, &path)?;
        }

        if let Some(progress) = &self.progress {
            progress.on_phase_end(PHASE_TRAVERSE);
        }
        Ok(())
    }

    fn hasher(&self) -> Hasher {
        Hasher::new(self.options.algorithm).with_shutdown_flag(Arc::clone(&self.shutdown_flag))
    }

    fn register_folder(
        &self,
        folder: &FolderDescriptor,
        counters: &ScanCounters,
    ) -> Result<i64, OrchestratorError> {
        let path = storage_path(&folder.path);
        let parent = folder.parent.as_deref().map(storage_path);
        if folder.is_errored() {
            ScanCounters::bump(&counters.folder_errors);
        }
        let id = self.catalog.upsert_folder(
            self.root.id,
            &path,
            parent.as_deref(),
            folder.error.as_deref(),
        )?;
        Ok(id)
    }

    /// Register a folder's files, queue the ones needing a fingerprint, and
    /// flag files that disappeared. Returns the number flagged.
    fn register_files(
        &self,
        folder_id: i64,
        folder: &FolderDescriptor,
        counters: &Arc<ScanCounters>,
        pool: &WorkerPool<HashJob>,
        hasher: &Arc<Hasher>,
    ) -> Result<u64, OrchestratorError> {
        let mut present = HashSet::with_capacity(folder.files.len());
        for file in &folder.files {
            let path = storage_path(&file.path);
            let upserted = self.catalog.upsert_file(&NewFile {
                root_id: self.root.id,
                folder_id,
                path: &path,
                size: file.size,
                mtime: file.mtime,
            })?;
            present.insert(upserted.id);
            ScanCounters::bump(&counters.files);

            if !upserted.needs_hash {
                continue;
            }
            let job = HashJob {
                catalog: Arc::clone(&self.catalog),
                file_id: upserted.id,
                path: file.path.clone(),
                hasher: Arc::clone(hasher),
                counters: Arc::clone(counters),
                progress: self.progress.clone(),
            };
            match pool.submit(job) {
                Ok(()) => {
                    ScanCounters::bump(&counters.files_queued);
                    if let Some(progress) = &self.progress {
                        progress.on_items_queued(1);
                    }
                }
                Err(PoolError::Cancelled) => return Err(OrchestratorError::Interrupted),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.catalog.mark_missing_files_removed(folder_id, &present)?)
    }

    /// Count a finished folder and save the checkpoint.
    fn advance(
        &self,
        checkpoint: &mut CheckpointManager,
        counters: &ScanCounters,
        path: &Path,
    ) -> Result<(), OrchestratorError> {
        let folders = ScanCounters::bump(&counters.folders);
        let path = storage_path(path);
        checkpoint.save(&path, folders, ScanCounters::get(&counters.files))?;
        if let Some(progress) = &self.progress {
            progress.on_folder_scanned(usize::try_from(folders).unwrap_or(usize::MAX), &path);
        }
        Ok(())
    }
}

fn path_exists(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}
