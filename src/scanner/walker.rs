//! Depth-first directory traversal using walkdir.
//!
//! # Overview
//!
//! [`Walker::walk`] returns a lazy [`FolderWalk`] iterator that yields one
//! [`FolderDescriptor`] per folder in depth-first pre-order: a folder is
//! always yielded before any of its descendants, and each descriptor already
//! holds the folder's complete list of immediate files.
//!
//! Within a directory, files are sorted ahead of subdirectories so a folder's
//! listing is complete as soon as the walk moves on to the next directory.
//!
//! # Error handling
//!
//! - A folder that cannot be listed is still yielded, with `error` set.
//! - A file whose metadata cannot be read is skipped with a warning.
//! - Symbolic links are skipped unless `traverse_links` is enabled; loops
//!   are reported and not followed.
//!
//! # Example
//!
//! ```no_run
//! use dupescan::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! for folder in walker.walk() {
//!     println!("{} ({} files)", folder.path.display(), folder.files.len());
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::{DiscoveredFile, FolderDescriptor, WalkerConfig};

/// Directory walker producing per-folder descriptors.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupescan::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// ```
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// The flag is checked each time the walk reaches a new directory.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Walk the whole tree below the root.
    #[must_use]
    pub fn walk(&self) -> FolderWalk {
        FolderWalk::new(self, false)
    }

    /// List the root folder's immediate files without descending.
    #[must_use]
    pub fn list_folder(&self) -> FolderDescriptor {
        FolderWalk::new(self, true).next().unwrap_or_else(|| {
            let mut folder = FolderDescriptor::new(self.root.clone(), None);
            folder.error = Some("folder could not be listed".to_string());
            folder
        })
    }
}

/// Lazy iterator over the folders of a tree. See [`Walker::walk`].
pub struct FolderWalk {
    inner: walkdir::IntoIter,
    root: PathBuf,
    shutdown_flag: Option<Arc<AtomicBool>>,
    listing_only: bool,
    pending: Option<FolderDescriptor>,
    finished: bool,
    interrupted: bool,
}

impl FolderWalk {
    fn new(walker: &Walker, listing_only: bool) -> Self {
        let mut walk_dir = WalkDir::new(&walker.root)
            .follow_links(walker.config.traverse_links)
            .sort_by(|a, b| {
                let a_dir = a.file_type().is_dir();
                let b_dir = b.file_type().is_dir();
                a_dir
                    .cmp(&b_dir)
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });
        if listing_only {
            walk_dir = walk_dir.max_depth(1);
        }

        Self {
            inner: walk_dir.into_iter(),
            root: walker.root.clone(),
            shutdown_flag: walker.shutdown_flag.clone(),
            listing_only,
            pending: None,
            finished: false,
            interrupted: false,
        }
    }

    /// Returns `true` if the walk stopped early because shutdown was requested.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Handle one successful walkdir entry. Returns a completed descriptor
    /// when the entry starts a new folder.
    fn handle_entry(&mut self, entry: walkdir::DirEntry) -> Option<FolderDescriptor> {
        let file_type = entry.file_type();
        let path = entry.path();

        if file_type.is_dir() {
            if self.listing_only && entry.depth() > 0 {
                return None;
            }
            let parent = if entry.depth() == 0 {
                None
            } else {
                path.parent().map(Path::to_path_buf)
            };
            let folder = FolderDescriptor::new(entry.into_path(), parent);
            return self.pending.replace(folder);
        }

        if file_type.is_symlink() {
            log::debug!("Skipping symlink: {}", path.display());
            return None;
        }

        if !file_type.is_file() {
            log::debug!("Skipping special file: {}", path.display());
            return None;
        }

        let Some(folder) = self.pending.as_mut() else {
            log::debug!("Ignoring file outside any folder: {}", path.display());
            return None;
        };

        match entry.metadata() {
            Ok(metadata) => {
                let mtime = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .and_then(|d| i64::try_from(d.as_secs()).ok())
                    .unwrap_or(0);
                folder.files.push(DiscoveredFile {
                    path: entry.into_path(),
                    size: metadata.len(),
                    mtime,
                });
            }
            Err(e) => {
                log::warn!("Cannot read metadata for {}: {}", path.display(), e);
            }
        }
        None
    }

    /// Handle a walkdir error. Returns a descriptor when the error is the
    /// root itself failing before any folder was produced.
    fn handle_error(&mut self, error: walkdir::Error) -> Option<FolderDescriptor> {
        let Some(path) = error.path().map(Path::to_path_buf) else {
            log::warn!("Walker error: {}", error);
            return None;
        };

        if let Some(ancestor) = error.loop_ancestor() {
            log::warn!(
                "Symlink loop at {} (points to {}), not followed",
                path.display(),
                ancestor.display()
            );
            return None;
        }

        let message = describe_error(&error);

        if let Some(folder) = self.pending.as_mut() {
            if folder.path == path {
                log::warn!("Cannot read folder {}: {}", path.display(), message);
                folder.error = Some(message);
                return None;
            }
        } else if error.depth() == 0 {
            log::warn!("Cannot read folder {}: {}", path.display(), message);
            let mut folder = FolderDescriptor::new(self.root.clone(), None);
            folder.error = Some(message);
            return Some(folder);
        }

        log::warn!("Skipping {}: {}", path.display(), message);
        None
    }
}

impl Iterator for FolderWalk {
    type Item = FolderDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return self.pending.take();
            }

            let Some(result) = self.inner.next() else {
                self.finished = true;
                continue;
            };

            match result {
                Ok(entry) => {
                    if entry.file_type().is_dir()
                        && !self.listing_only
                        && self.is_shutdown_requested()
                    {
                        log::debug!("Walker: Shutdown requested, stopping iteration");
                        self.interrupted = true;
                        self.finished = true;
                        self.pending = None;
                        return None;
                    }
                    if let Some(done) = self.handle_entry(entry) {
                        return Some(done);
                    }
                }
                Err(error) => {
                    if let Some(done) = self.handle_error(error) {
                        return Some(done);
                    }
                }
            }
        }
    }
}

/// Render a walkdir error without repeating the path.
fn describe_error(error: &walkdir::Error) -> String {
    match error.io_error() {
        Some(io) => io.to_string(),
        None => error.to_string(),
    }
}
