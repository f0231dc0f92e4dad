//! Hash jobs executed by the worker pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogError};
use crate::pool::Job;
use crate::progress::{ProgressCallback, ScanCounters};

use super::{HashError, Hasher};

/// Error status recorded on a file whose hashing was cut short by shutdown.
/// The next traversal clears it when the file is registered again.
pub const INTERRUPTED_STATUS: &str = "interrupted";

/// Fingerprint one cataloged file and store the result.
///
/// Hashing failures are recorded on the file row and do not fail the job;
/// only a failed catalog write does.
pub struct HashJob {
    pub catalog: Arc<Catalog>,
    pub file_id: i64,
    pub path: PathBuf,
    pub hasher: Arc<Hasher>,
    pub counters: Arc<ScanCounters>,
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl Job for HashJob {
    type Error = CatalogError;

    fn id(&self) -> String {
        format!("file {} ({})", self.file_id, self.path.display())
    }

    fn process(self, shutdown: &AtomicBool) -> Result<(), CatalogError> {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        match self.hasher.hash_file(&self.path) {
            Ok(fingerprint) => {
                self.catalog.update_file_fingerprint(self.file_id, &fingerprint)?;
                let done = ScanCounters::bump(&self.counters.files_hashed);
                if let Some(progress) = &self.progress {
                    progress.on_progress(usize::try_from(done).unwrap_or(usize::MAX), &self.path.to_string_lossy());
                    if let Ok(meta) = std::fs::metadata(&self.path) {
                        progress.on_item_completed(meta.len());
                    }
                }
            }
            Err(HashError::Interrupted(_)) => {
                log::debug!("Hashing of {} interrupted", self.path.display());
                self.catalog.mark_file_error(self.file_id, INTERRUPTED_STATUS)?;
            }
            Err(e) => {
                log::warn!("Failed to fingerprint {}: {}", self.path.display(), e);
                self.catalog.mark_file_error(self.file_id, &e.to_string())?;
                ScanCounters::bump(&self.counters.hash_failures);
                ScanCounters::bump(&self.counters.file_errors);
            }
        }
        Ok(())
    }
}
