//! Catalog row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered scan root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFolder {
    /// Catalog row id
    pub id: i64,
    /// Absolute path
    pub path: String,
    /// Whether scans descend through symbolic links
    pub traverse_links: bool,
    /// Folders cataloged under this root (not removed)
    pub folder_count: u64,
    /// Files cataloged under this root (not removed)
    pub file_count: u64,
    /// Total bytes of cataloged files (not removed)
    pub total_size: u64,
    /// When the last scan finished
    pub last_scan_at: Option<DateTime<Utc>>,
    /// When the root was registered
    pub created_at: DateTime<Utc>,
}

/// A cataloged folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderRecord {
    pub id: i64,
    pub root_id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub error_status: Option<String>,
    pub removed: bool,
    pub last_scanned_at: DateTime<Utc>,
}

/// A cataloged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub root_id: i64,
    pub folder_id: Option<i64>,
    pub path: String,
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
    pub fingerprint: Option<String>,
    /// Algorithm name as stored; may be one this build no longer supports
    pub fingerprint_algorithm: Option<String>,
    pub error_status: Option<String>,
    pub removed: bool,
}

/// Input for registering a file found during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile<'a> {
    pub root_id: i64,
    pub folder_id: i64,
    pub path: &'a str,
    pub size: u64,
    pub mtime: i64,
}

/// Outcome of registering a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedFile {
    /// Catalog row id
    pub id: i64,
    /// The file has no fingerprint and should be hashed
    pub needs_hash: bool,
}

/// Aggregate statistics written back to a root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RootStats {
    pub folder_count: u64,
    pub file_count: u64,
    pub total_size: u64,
}

/// Rows deleted by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub folders: u64,
    pub files: u64,
}
