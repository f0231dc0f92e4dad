//! Scanner module: traversal, fingerprinting, and scan orchestration.
//!
//! This module provides functionality for:
//! - Depth-first directory traversal producing one descriptor per folder
//! - Streaming content fingerprints (SHA-256, SHA-512, BLAKE3)
//! - Running resumable scans against the catalog
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal, one [`FolderDescriptor`] per folder
//! - [`hasher`]: Chunked file hashing with cancellation between chunks
//! - [`jobs`]: Hash jobs executed by the worker pool
//! - [`orchestrator`]: The [`Scanner`] that ties traversal, hashing and checkpoints together
//! - [`path_utils`]: Path cleaning and comparison keys
//!
//! # Example
//!
//! ```no_run
//! use dupescan::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for folder in walker.walk() {
//!     match &folder.error {
//!         Some(err) => eprintln!("{}: {}", folder.path.display(), err),
//!         None => println!("{}: {} files", folder.path.display(), folder.files.len()),
//!     }
//! }
//! ```

pub mod hasher;
pub mod jobs;
pub mod orchestrator;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;

pub use hasher::{Fingerprint, HashAlgorithm, Hasher, UnsupportedAlgorithm, CHUNK_SIZE};
pub use jobs::HashJob;
pub use orchestrator::{OrchestratorError, ScanOptions, ScanSummary, Scanner};
pub use walker::{FolderWalk, Walker};

/// A regular file discovered during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
}

/// One folder as seen by the traverser.
///
/// `files` lists the folder's immediate regular files. When the folder could
/// not be read, `error` describes why and `files` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderDescriptor {
    /// Full path to the folder
    pub path: PathBuf,
    /// Parent folder, `None` for the traversal root
    pub parent: Option<PathBuf>,
    /// Immediate regular files
    pub files: Vec<DiscoveredFile>,
    /// Why the folder could not be listed, if it could not
    pub error: Option<String>,
}

impl FolderDescriptor {
    /// Create an empty descriptor.
    #[must_use]
    pub fn new(path: PathBuf, parent: Option<PathBuf>) -> Self {
        Self {
            path,
            parent,
            files: Vec::new(),
            error: None,
        }
    }

    /// Returns `true` if the folder could not be listed.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Total size of the listed files.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Descend into directories reached through symbolic links.
    ///
    /// Loops are detected and reported instead of followed.
    pub traverse_links: bool,
}

impl WalkerConfig {
    /// Create a configuration with the given link policy.
    #[must_use]
    pub fn new(traverse_links: bool) -> Self {
        Self { traverse_links }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Check that a path exists and is a directory.
///
/// # Errors
///
/// Returns [`ScanError`] describing why the path is unusable as a scan root.
pub fn ensure_directory(path: &std::path::Path) -> Result<(), ScanError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ScanError::NotADirectory(path.to_path_buf())),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Err(ScanError::NotFound(path.to_path_buf())),
            std::io::ErrorKind::PermissionDenied => {
                Err(ScanError::PermissionDenied(path.to_path_buf()))
            }
            _ => Err(ScanError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        },
    }
}
