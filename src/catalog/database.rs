//! SQLite-backed catalog.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use super::entry::{
    FileRecord, FolderRecord, NewFile, PurgeCounts, RootFolder, RootStats, UpsertedFile,
};
use super::{schema, CatalogError};
use crate::checkpoint::{ScanMode, ScanState, ScanStatus};
use crate::scanner::path_utils::{fs_path, is_within, storage_path};
use crate::scanner::Fingerprint;

const ROOT_COLUMNS: &str =
    "id, path, traverse_links, folder_count, file_count, total_size, last_scan_at, created_at";

const FOLDER_COLUMNS: &str =
    "id, root_folder_id, parent_folder_id, path, error_status, removed, last_scanned_at";

const FILE_COLUMNS: &str = "id, root_folder_id, folder_id, path, size, mtime, fingerprint, \
                            fingerprint_algorithm, error_status, removed";

const SCAN_STATE_COLUMNS: &str = "id, root_folder_id, scan_mode, current_folder_path, started_at, \
                                  updated_at, completed_at, status, files_processed, folders_processed";

const UPSERT_FOLDER_SQL: &str = "
    INSERT INTO folders (root_folder_id, parent_folder_id, path, error_status, removed,
                         first_scanned_at, last_scanned_at)
    VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
    ON CONFLICT(path) DO UPDATE SET
        root_folder_id = excluded.root_folder_id,
        parent_folder_id = excluded.parent_folder_id,
        error_status = excluded.error_status,
        removed = 0,
        last_scanned_at = excluded.last_scanned_at
    RETURNING id";

// Every right-hand side sees the pre-update row, so the fingerprint survives
// only when neither size nor mtime changed.
const UPSERT_FILE_SQL: &str = "
    INSERT INTO files (root_folder_id, folder_id, path, size, mtime, removed,
                       first_scanned_at, last_scanned_at)
    VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
    ON CONFLICT(path) DO UPDATE SET
        root_folder_id = excluded.root_folder_id,
        folder_id = excluded.folder_id,
        fingerprint = CASE WHEN files.size = excluded.size AND files.mtime = excluded.mtime
                           THEN files.fingerprint ELSE NULL END,
        fingerprint_algorithm = CASE WHEN files.size = excluded.size AND files.mtime = excluded.mtime
                                     THEN files.fingerprint_algorithm ELSE NULL END,
        hashed_at = CASE WHEN files.size = excluded.size AND files.mtime = excluded.mtime
                         THEN files.hashed_at ELSE NULL END,
        size = excluded.size,
        mtime = excluded.mtime,
        error_status = NULL,
        removed = 0,
        last_scanned_at = excluded.last_scanned_at
    RETURNING id, fingerprint IS NULL";

/// Files sharing size and fingerprint, as counted by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintGroup {
    /// Size shared by every file in the group
    pub size: u64,
    /// Shared fingerprint value
    pub fingerprint: String,
    /// Algorithm that produced `fingerprint`
    pub algorithm: String,
    /// Number of catalog rows in the group
    pub count: u64,
}

/// Persistent catalog.
///
/// The connection is guarded by a mutex so the catalog can be shared between
/// the scan thread and hash workers behind an `Arc`.
pub struct Catalog {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("path", &self.path).finish()
    }
}

/// Apply WAL-mode pragmas and enforce foreign keys.
fn apply_pragmas(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(Duration::from_secs(10))?;
    Ok(())
}

impl Catalog {
    /// Open (or create) the catalog at `path`, creating parent directories
    /// and applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the directory cannot be created, the file
    /// is not a usable database, or a migration fails.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CatalogError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let catalog = Self::init(conn, Some(path.to_path_buf()))?;
        log::debug!("Opened catalog at {}", path.display());
        Ok(catalog)
    }

    /// Open a private in-memory catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, CatalogError> {
        apply_pragmas(&conn)?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Location of the catalog file, `None` when in memory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::LockPoisoned)
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    // ── Roots ────────────────────────────────────────────────────────

    /// Register a root, or update the link policy of an existing one.
    ///
    /// Roots may not nest: folders and files belong to exactly one root.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::OverlappingRoot`] if `path` contains or lies
    /// inside another registered root, and [`CatalogError::Sqlite`] on
    /// database failure.
    pub fn register_root(&self, path: &Path, traverse_links: bool) -> Result<RootFolder, CatalogError> {
        let path_str = storage_path(path);
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT path FROM root_folders WHERE path <> ?1")?;
        let existing = stmt
            .query_map([&path_str], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        for other in existing {
            let other_path = fs_path(&other);
            if is_within(path, &other_path) || is_within(&other_path, path) {
                return Err(CatalogError::OverlappingRoot {
                    path: path_str,
                    existing: other,
                });
            }
        }

        conn.execute(
            "INSERT INTO root_folders (path, traverse_links, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET traverse_links = excluded.traverse_links",
            params![path_str, traverse_links, Utc::now().timestamp()],
        )?;
        query_root_by_path(&conn, &path_str)?.ok_or(CatalogError::RootNotFound(path_str))
    }

    /// Look up a root by path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn get_root_by_path(&self, path: &Path) -> Result<Option<RootFolder>, CatalogError> {
        let conn = self.conn()?;
        query_root_by_path(&conn, &storage_path(path))
    }

    /// Look up a root by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn get_root(&self, id: i64) -> Result<Option<RootFolder>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ROOT_COLUMNS} FROM root_folders WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], root_from_row).optional()?)
    }

    /// All registered roots, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn list_roots(&self) -> Result<Vec<RootFolder>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ROOT_COLUMNS} FROM root_folders ORDER BY path");
        let mut stmt = conn.prepare(&sql)?;
        let roots = stmt
            .query_map([], root_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roots)
    }

    /// Remove a root and everything cataloged under it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::RootNotFound`] if no root has this path.
    pub fn deregister_root(&self, path: &Path) -> Result<RootFolder, CatalogError> {
        let path_str = storage_path(path);
        let conn = self.conn()?;
        let root = query_root_by_path(&conn, &path_str)?
            .ok_or_else(|| CatalogError::RootNotFound(path_str.clone()))?;
        conn.execute("DELETE FROM root_folders WHERE id = ?1", [root.id])?;
        log::info!("Deregistered root {}", root.path);
        Ok(root)
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Register a folder seen during traversal and return its id.
    ///
    /// `error` replaces any previously recorded error; `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn upsert_folder(
        &self,
        root_id: i64,
        path: &str,
        parent: Option<&str>,
        error: Option<&str>,
    ) -> Result<i64, CatalogError> {
        let conn = self.conn()?;
        let parent_id: Option<i64> = match parent {
            Some(parent) => conn
                .query_row("SELECT id FROM folders WHERE path = ?1", [parent], |row| row.get(0))
                .optional()?,
            None => None,
        };
        let id = conn.query_row(
            UPSERT_FOLDER_SQL,
            params![root_id, parent_id, path, error, Utc::now().timestamp()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Look up a folder by path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn get_folder_by_path(&self, path: &str) -> Result<Option<FolderRecord>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?1");
        Ok(conn.query_row(&sql, [path], folder_from_row).optional()?)
    }

    /// Folders under a root ordered by path, optionally including removed ones.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn list_folders(
        &self,
        root_id: i64,
        include_removed: bool,
    ) -> Result<Vec<FolderRecord>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders
             WHERE root_folder_id = ?1 AND (?2 OR removed = 0)
             ORDER BY path"
        );
        let mut stmt = conn.prepare(&sql)?;
        let folders = stmt
            .query_map(params![root_id, include_removed], folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    /// Record (or clear) a folder's listing error.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn set_folder_error(&self, folder_id: i64, error: Option<&str>) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE folders SET error_status = ?2, last_scanned_at = ?3 WHERE id = ?1",
            params![folder_id, error, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Flag a folder and the files directly inside it as removed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn mark_folder_removed(&self, folder_id: i64) -> Result<(), CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE folders SET removed = 1 WHERE id = ?1", [folder_id])?;
        tx.execute("UPDATE files SET removed = 1 WHERE folder_id = ?1", [folder_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Flag every active folder under `root_id` whose id is not in `seen`,
    /// together with its files, as removed. Returns the number of folders flagged.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn mark_unseen_folders_removed(
        &self,
        root_id: i64,
        seen: &HashSet<i64>,
    ) -> Result<u64, CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let active: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM folders WHERE root_folder_id = ?1 AND removed = 0")?;
            let ids = stmt
                .query_map([root_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut flagged = 0;
        for id in active.into_iter().filter(|id| !seen.contains(id)) {
            tx.execute("UPDATE folders SET removed = 1 WHERE id = ?1", [id])?;
            tx.execute("UPDATE files SET removed = 1 WHERE folder_id = ?1", [id])?;
            flagged += 1;
        }
        tx.commit()?;
        Ok(flagged)
    }

    // ── Files ────────────────────────────────────────────────────────

    /// Register a file seen during traversal.
    ///
    /// Clears any previous error and the removed flag. The fingerprint is
    /// kept only if size and modification time are unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn upsert_file(&self, file: &NewFile<'_>) -> Result<UpsertedFile, CatalogError> {
        let conn = self.conn()?;
        let upserted = conn.query_row(
            UPSERT_FILE_SQL,
            params![
                file.root_id,
                file.folder_id,
                file.path,
                to_i64(file.size),
                file.mtime,
                Utc::now().timestamp()
            ],
            |row| {
                Ok(UpsertedFile {
                    id: row.get(0)?,
                    needs_hash: row.get(1)?,
                })
            },
        )?;
        Ok(upserted)
    }

    /// Store a file's fingerprint and clear its error.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn update_file_fingerprint(
        &self,
        file_id: i64,
        fingerprint: &Fingerprint,
    ) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET fingerprint = ?2, fingerprint_algorithm = ?3, hashed_at = ?4,
                              error_status = NULL
             WHERE id = ?1",
            params![
                file_id,
                fingerprint.value,
                fingerprint.algorithm.name(),
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// Record why a file could not be fingerprinted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn mark_file_error(&self, file_id: i64, error: &str) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE files SET error_status = ?2 WHERE id = ?1",
            params![file_id, error],
        )?;
        Ok(())
    }

    /// Flag active files in `folder_id` whose ids are not in `present` as
    /// removed. Returns the number flagged.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn mark_missing_files_removed(
        &self,
        folder_id: i64,
        present: &HashSet<i64>,
    ) -> Result<u64, CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let active: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM files WHERE folder_id = ?1 AND removed = 0")?;
            let ids = stmt
                .query_map([folder_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut flagged = 0;
        for id in active.into_iter().filter(|id| !present.contains(id)) {
            tx.execute("UPDATE files SET removed = 1 WHERE id = ?1", [id])?;
            flagged += 1;
        }
        tx.commit()?;
        Ok(flagged)
    }

    /// Look up a file by path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1");
        Ok(conn.query_row(&sql, [path], file_from_row).optional()?)
    }

    /// Files under a root ordered by path, optionally including removed ones.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn list_files(&self, root_id: i64, include_removed: bool) -> Result<Vec<FileRecord>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE root_folder_id = ?1 AND (?2 OR removed = 0)
             ORDER BY path"
        );
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map(params![root_id, include_removed], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // ── Duplicate queries ────────────────────────────────────────────

    /// Groups of eligible files sharing size, fingerprint and algorithm,
    /// largest size first.
    ///
    /// Eligible files are fingerprinted, not removed, error-free, non-empty,
    /// and at least `min_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn fingerprint_groups(
        &self,
        min_size: u64,
        min_count: u64,
        root_id: Option<i64>,
    ) -> Result<Vec<FingerprintGroup>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT size, fingerprint, fingerprint_algorithm, COUNT(*) AS member_count
             FROM files
             WHERE fingerprint IS NOT NULL
               AND fingerprint_algorithm IS NOT NULL
               AND removed = 0
               AND error_status IS NULL
               AND size > 0
               AND size >= ?1
               AND (?3 IS NULL OR root_folder_id = ?3)
             GROUP BY size, fingerprint, fingerprint_algorithm
             HAVING COUNT(*) >= ?2
             ORDER BY size DESC, fingerprint, fingerprint_algorithm",
        )?;
        let groups = stmt
            .query_map(params![to_i64(min_size), to_i64(min_count), root_id], |row| {
                Ok(FingerprintGroup {
                    size: to_u64(row.get(0)?),
                    fingerprint: row.get(1)?,
                    algorithm: row.get(2)?,
                    count: to_u64(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Eligible members of one fingerprint group, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn group_members(
        &self,
        group: &FingerprintGroup,
        root_id: Option<i64>,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE size = ?1 AND fingerprint = ?2 AND fingerprint_algorithm = ?3
               AND removed = 0 AND error_status IS NULL
               AND (?4 IS NULL OR root_folder_id = ?4)
             ORDER BY path"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let files = stmt
            .query_map(
                params![to_i64(group.size), group.fingerprint, group.algorithm, root_id],
                file_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // ── Scan state ───────────────────────────────────────────────────

    /// Create a running checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ActiveScanExists`] if an active checkpoint
    /// already exists for the root and mode.
    pub fn insert_scan_state(&self, root_id: i64, mode: ScanMode) -> Result<ScanState, CatalogError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO scan_state (root_folder_id, scan_mode, status, started_at, updated_at)
             VALUES (?1, ?2, 'running', ?3, ?3)
             RETURNING {SCAN_STATE_COLUMNS}"
        );
        match conn.query_row(&sql, params![root_id, mode, now], scan_state_from_row) {
            Ok(state) => Ok(state),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(CatalogError::ActiveScanExists { root_id, mode })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The active checkpoint for a root and mode, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn active_scan_state(
        &self,
        root_id: i64,
        mode: ScanMode,
    ) -> Result<Option<ScanState>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SCAN_STATE_COLUMNS} FROM scan_state
             WHERE root_folder_id = ?1 AND scan_mode = ?2
               AND status IN ('running', 'interrupted')"
        );
        Ok(conn
            .query_row(&sql, params![root_id, mode], scan_state_from_row)
            .optional()?)
    }

    /// Fetch a checkpoint by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn get_scan_state(&self, id: i64) -> Result<Option<ScanState>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SCAN_STATE_COLUMNS} FROM scan_state WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], scan_state_from_row).optional()?)
    }

    /// All checkpoints for a root, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn list_scan_states(&self, root_id: i64) -> Result<Vec<ScanState>, CatalogError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SCAN_STATE_COLUMNS} FROM scan_state WHERE root_folder_id = ?1
             ORDER BY started_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let states = stmt
            .query_map([root_id], scan_state_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(states)
    }

    /// Persist progress on a running checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ScanStateNotRunning`] if the checkpoint is not running.
    pub fn update_scan_progress(
        &self,
        id: i64,
        current_folder: &str,
        folders_processed: u64,
        files_processed: u64,
    ) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE scan_state
             SET current_folder_path = ?2, folders_processed = ?3, files_processed = ?4,
                 updated_at = ?5
             WHERE id = ?1 AND status = 'running'",
            params![
                id,
                current_folder,
                to_i64(folders_processed),
                to_i64(files_processed),
                Utc::now().timestamp()
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::ScanStateNotRunning(id));
        }
        Ok(())
    }

    /// Move a checkpoint from `from` to `to`. Returns `false` if the
    /// checkpoint was not in state `from`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn transition_scan_state(
        &self,
        id: i64,
        from: ScanStatus,
        to: ScanStatus,
    ) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let completed_at = (to == ScanStatus::Completed).then_some(now);
        let changed = conn.execute(
            "UPDATE scan_state
             SET status = ?3, updated_at = ?4, completed_at = COALESCE(?5, completed_at)
             WHERE id = ?1 AND status = ?2",
            params![id, from, to, now, completed_at],
        )?;
        Ok(changed == 1)
    }

    /// Delete every checkpoint for a root and mode. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn delete_scan_states(&self, root_id: i64, mode: ScanMode) -> Result<u64, CatalogError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM scan_state WHERE root_folder_id = ?1 AND scan_mode = ?2",
            params![root_id, mode],
        )?;
        Ok(deleted as u64)
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Compute a root's statistics from its active folders and files.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn compute_root_stats(&self, root_id: i64) -> Result<RootStats, CatalogError> {
        let conn = self.conn()?;
        query_root_stats(&conn, root_id)
    }

    /// Recompute a root's statistics and write them back.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn refresh_root_stats(&self, root_id: i64) -> Result<RootStats, CatalogError> {
        let conn = self.conn()?;
        let stats = query_root_stats(&conn, root_id)?;
        conn.execute(
            "UPDATE root_folders
             SET folder_count = ?2, file_count = ?3, total_size = ?4, last_scan_at = ?5
             WHERE id = ?1",
            params![
                root_id,
                to_i64(stats.folder_count),
                to_i64(stats.file_count),
                to_i64(stats.total_size),
                Utc::now().timestamp()
            ],
        )?;
        log::debug!(
            "Root {} stats: {} folders, {} files, {} bytes",
            root_id,
            stats.folder_count,
            stats.file_count,
            stats.total_size
        );
        Ok(stats)
    }

    /// Permanently delete rows flagged as removed under a root.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure.
    pub fn purge_removed(&self, root_id: i64) -> Result<PurgeCounts, CatalogError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let files = tx.execute(
            "DELETE FROM files WHERE root_folder_id = ?1 AND removed = 1",
            [root_id],
        )?;
        let folders = tx.execute(
            "DELETE FROM folders WHERE root_folder_id = ?1 AND removed = 1",
            [root_id],
        )?;
        tx.commit()?;
        Ok(PurgeCounts {
            folders: folders as u64,
            files: files as u64,
        })
    }
}

fn query_root_by_path(conn: &Connection, path: &str) -> Result<Option<RootFolder>, CatalogError> {
    let sql = format!("SELECT {ROOT_COLUMNS} FROM root_folders WHERE path = ?1");
    Ok(conn.query_row(&sql, [path], root_from_row).optional()?)
}

pub(crate) fn query_root_stats(conn: &Connection, root_id: i64) -> Result<RootStats, CatalogError> {
    let folder_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM folders WHERE root_folder_id = ?1 AND removed = 0",
        [root_id],
        |row| row.get(0),
    )?;
    let (file_count, total_size): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files
         WHERE root_folder_id = ?1 AND removed = 0",
        [root_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(RootStats {
        folder_count: to_u64(folder_count),
        file_count: to_u64(file_count),
        total_size: to_u64(total_size),
    })
}

fn root_from_row(row: &Row<'_>) -> rusqlite::Result<RootFolder> {
    Ok(RootFolder {
        id: row.get(0)?,
        path: row.get(1)?,
        traverse_links: row.get(2)?,
        folder_count: to_u64(row.get(3)?),
        file_count: to_u64(row.get(4)?),
        total_size: to_u64(row.get(5)?),
        last_scan_at: row.get::<_, Option<i64>>(6)?.map(from_timestamp),
        created_at: from_timestamp(row.get(7)?),
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<FolderRecord> {
    Ok(FolderRecord {
        id: row.get(0)?,
        root_id: row.get(1)?,
        parent_id: row.get(2)?,
        path: row.get(3)?,
        error_status: row.get(4)?,
        removed: row.get(5)?,
        last_scanned_at: from_timestamp(row.get(6)?),
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        root_id: row.get(1)?,
        folder_id: row.get(2)?,
        path: row.get(3)?,
        size: to_u64(row.get(4)?),
        mtime: row.get(5)?,
        fingerprint: row.get(6)?,
        fingerprint_algorithm: row.get(7)?,
        error_status: row.get(8)?,
        removed: row.get(9)?,
    })
}

fn scan_state_from_row(row: &Row<'_>) -> rusqlite::Result<ScanState> {
    Ok(ScanState {
        id: row.get(0)?,
        root_id: row.get(1)?,
        mode: row.get(2)?,
        current_folder: row.get(3)?,
        started_at: from_timestamp(row.get(4)?),
        updated_at: from_timestamp(row.get(5)?),
        completed_at: row.get::<_, Option<i64>>(6)?.map(from_timestamp),
        status: row.get(7)?,
        files_processed: to_u64(row.get(8)?),
        folders_processed: to_u64(row.get(9)?),
    })
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// SQLite integers are signed; sizes beyond `i64::MAX` saturate.
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl ToSql for ScanMode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScanMode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ScanStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScanStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
