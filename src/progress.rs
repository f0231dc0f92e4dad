//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display progress bars in the terminal while a scan runs, and
//! [`ScanCounters`], the atomic counters a scan accumulates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name for directory traversal.
pub const PHASE_TRAVERSE: &str = "traverse";
/// Phase name for fingerprinting.
pub const PHASE_HASH: &str = "hash";

/// Progress callback for scan phases.
///
/// Implement this trait to receive progress updates during a scan.
/// Methods may be called from hash worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase ([`PHASE_TRAVERSE`] or [`PHASE_HASH`])
    /// * `total` - Items known up front; 0 when the total grows as the scan runs
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each file fingerprinted.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called after each folder is registered.
    ///
    /// # Arguments
    ///
    /// * `count` - Folders done so far
    /// * `path` - The folder just finished
    fn on_folder_scanned(&self, _count: usize, _path: &str) {}

    /// Called when more items were queued for the running phase.
    fn on_items_queued(&self, _count: usize) {}

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Counters accumulated by a scan.
///
/// Shared between the traversal thread and hash workers.
#[derive(Debug, Default)]
pub struct ScanCounters {
    pub folders: AtomicU64,
    pub files: AtomicU64,
    pub files_queued: AtomicU64,
    pub files_hashed: AtomicU64,
    pub bytes_hashed: AtomicU64,
    pub hash_failures: AtomicU64,
    pub folder_errors: AtomicU64,
    pub file_errors: AtomicU64,
}

impl ScanCounters {
    /// Increment `counter` by one and return the new value.
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Read a counter.
    #[must_use]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Progress reporter using indicatif.
///
/// One spinner for traversal and one bar for hashing, whose length grows as
/// files are queued.
pub struct Progress {
    multi: MultiProgress,
    traverse: Mutex<Option<ProgressBar>>,
    hash: Mutex<Option<ProgressBar>>,
    quiet: bool,
    tick: Duration,
}

/// Default spinner refresh interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupescan::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            traverse: Mutex::new(None),
            hash: Mutex::new(None),
            quiet,
            tick: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Set the spinner refresh interval. Zero disables the steady tick.
    #[must_use]
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn traverse_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} folders")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hash_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} {per_sec}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn slot(&self, phase: &str) -> Option<&Mutex<Option<ProgressBar>>> {
        match phase {
            PHASE_TRAVERSE => Some(&self.traverse),
            PHASE_HASH => Some(&self.hash),
            _ => None,
        }
    }

    fn with_bar(slot: &Mutex<Option<ProgressBar>>, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = slot.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let Some(slot) = self.slot(phase) else {
            return;
        };

        let pb = if phase == PHASE_TRAVERSE {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::traverse_style());
            pb.set_message("Scanning folders");
            if !self.tick.is_zero() {
                pb.enable_steady_tick(self.tick);
            }
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::hash_style());
            pb.set_message("Fingerprinting");
            pb
        };

        if let Ok(mut guard) = slot.lock() {
            *guard = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        let message = truncate_path(path, 30);
        Self::with_bar(&self.hash, |pb| {
            pb.set_position(current as u64);
            pb.set_message(message);
        });
    }

    fn on_folder_scanned(&self, count: usize, path: &str) {
        if self.quiet {
            return;
        }
        let message = truncate_path(path, 30);
        Self::with_bar(&self.traverse, |pb| {
            pb.set_position(count as u64);
            pb.set_message(message);
        });
    }

    fn on_items_queued(&self, count: usize) {
        if self.quiet {
            return;
        }
        Self::with_bar(&self.hash, |pb| pb.inc_length(count as u64));
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let Some(slot) = self.slot(phase) else {
            return;
        };
        if let Some(pb) = slot.lock().ok().and_then(|mut guard| guard.take()) {
            pb.finish_with_message(if phase == PHASE_TRAVERSE {
                "Traversal complete"
            } else {
                "Fingerprinting complete"
            });
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.multi.println(message);
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let chars = file_name.chars().count();
    if chars + 4 > max_len {
        let tail: String = file_name.chars().skip(chars.saturating_sub(max_len - 3)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
