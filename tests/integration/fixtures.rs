//! Shared helpers: a temporary tree registered in an in-memory catalog.

#![allow(dead_code)]

use dupescan::catalog::{Catalog, FileRecord, RootFolder};
use dupescan::checkpoint::ScanMode;
use dupescan::pool::PoolConfig;
use dupescan::scanner::path_utils::{absolute_root, storage_path};
use dupescan::scanner::{HashAlgorithm, ScanOptions, ScanSummary, Scanner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub root: PathBuf,
    pub catalog: Arc<Catalog>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_catalog(Catalog::open_in_memory().unwrap())
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        let dir = TempDir::new().unwrap();
        let root = absolute_root(dir.path()).unwrap();
        Self {
            dir,
            root,
            catalog: Arc::new(catalog),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn register(&self) -> RootFolder {
        self.catalog.register_root(&self.root, false).unwrap()
    }

    pub fn scanner(&self, mode: ScanMode) -> Scanner {
        Scanner::new(Arc::clone(&self.catalog), &self.root, options(mode)).unwrap()
    }

    pub fn scan(&self, mode: ScanMode) -> ScanSummary {
        self.scanner(mode).scan(false).unwrap()
    }

    pub fn file(&self, rel: &str) -> Option<FileRecord> {
        self.catalog
            .get_file_by_path(&storage_path(&self.path(rel)))
            .unwrap()
    }

    pub fn root_id(&self) -> i64 {
        self.catalog.get_root_by_path(&self.root).unwrap().unwrap().id
    }

    /// Catalog contents relative to the root, independent of row ids.
    pub fn snapshot(&self) -> Vec<Snapshot> {
        let prefix = storage_path(&self.root);
        let mut rows: Vec<_> = self
            .catalog
            .list_files(self.root_id(), true)
            .unwrap()
            .into_iter()
            .map(|f| Snapshot {
                path: f.path.trim_start_matches(&prefix).to_string(),
                size: f.size,
                fingerprint: f.fingerprint,
                algorithm: f.fingerprint_algorithm,
                error: f.error_status,
                removed: f.removed,
            })
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: String,
    pub size: u64,
    pub fingerprint: Option<String>,
    pub algorithm: Option<String>,
    pub error: Option<String>,
    pub removed: bool,
}

pub fn options(mode: ScanMode) -> ScanOptions {
    ScanOptions {
        mode,
        algorithm: HashAlgorithm::Sha256,
        pool: PoolConfig::with_workers(2),
    }
}

/// Build a tree with `folders` subfolders holding `files` files each. Every
/// file at the same index has identical content across folders.
pub fn populate(fixture: &Fixture, folders: usize, files: usize) {
    for d in 0..folders {
        for f in 0..files {
            fixture.write(
                &format!("dir{d:02}/file{f:02}.bin"),
                format!("content {f}").as_bytes(),
            );
        }
    }
}

pub fn is_root_user() -> bool {
    // Permission tests are meaningless when the process can read anything.
    let sample = tempfile::NamedTempFile::new().unwrap();
    set_mode(sample.path(), 0o000);
    let readable = fs::File::open(sample.path()).is_ok();
    set_mode(sample.path(), 0o644);
    readable
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) {}
