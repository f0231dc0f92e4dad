//! Persistent catalog of roots, folders, files, and scan checkpoints.
//!
//! # Architecture
//!
//! * [`database`]: [`Catalog`], the SQLite-backed store and all of its queries.
//! * [`entry`]: Row models returned by the catalog.
//! * [`schema`]: Table definitions and ordered migrations.
//! * [`verify`]: Integrity checks with optional repair.
//!
//! # Identity
//!
//! Folders and files are keyed by their full path. Registering a path that
//! already exists updates the row in place, so re-scanning a tree never
//! creates duplicate rows. A file whose size or modification time changed
//! loses its fingerprint and is hashed again.
//!
//! # Removal
//!
//! Entries that disappear from disk are flagged `removed` rather than
//! deleted; [`Catalog::purge_removed`] deletes them for good.

pub mod database;
pub mod entry;
pub mod schema;
pub mod verify;

use std::path::PathBuf;

use crate::checkpoint::ScanMode;

pub use database::{Catalog, FingerprintGroup};
pub use entry::{
    FileRecord, FolderRecord, NewFile, PurgeCounts, RootFolder, RootStats, UpsertedFile,
};
pub use verify::{CheckResult, VerifyReport};

/// Errors returned by the catalog.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The underlying database reported an error.
    #[error("Catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory holding the catalog could not be created.
    #[error("Failed to create catalog directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The catalog was written by a newer version.
    #[error("Catalog schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the catalog
        found: i64,
        /// Newest version this build understands
        supported: i64,
    },

    /// No root is registered at the given path.
    #[error("Root folder not registered: {0}")]
    RootNotFound(String),

    /// The root would contain, or sit inside, another registered root.
    #[error("Root {path} overlaps registered root {existing}")]
    OverlappingRoot {
        /// Path being registered
        path: String,
        /// Registered root it overlaps
        existing: String,
    },

    /// An active checkpoint already exists for the root and mode.
    #[error("A {mode} scan of root {root_id} is already active")]
    ActiveScanExists {
        /// Root id
        root_id: i64,
        /// Scan mode
        mode: ScanMode,
    },

    /// The checkpoint is not in a state that allows the update.
    #[error("Scan state {0} is not running")]
    ScanStateNotRunning(i64),

    /// Another thread panicked while holding the connection.
    #[error("Catalog connection lock poisoned")]
    LockPoisoned,
}
