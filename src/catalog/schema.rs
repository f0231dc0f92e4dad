//! Catalog schema and migrations.
//!
//! Migrations are applied in order inside a single transaction each and
//! recorded in `schema_migrations`, so opening an existing catalog only runs
//! what is missing.

use rusqlite::{params, Connection, OptionalExtension};

use super::CatalogError;

/// Ordered list of (version, SQL) migrations.
const MIGRATIONS: &[(i64, &str)] = &[(1, INITIAL_SCHEMA)];

const INITIAL_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS root_folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    traverse_links INTEGER NOT NULL DEFAULT 0,
    folder_count INTEGER NOT NULL DEFAULT 0,
    file_count INTEGER NOT NULL DEFAULT 0,
    total_size INTEGER NOT NULL DEFAULT 0,
    last_scan_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_folder_id INTEGER NOT NULL REFERENCES root_folders(id) ON DELETE CASCADE,
    parent_folder_id INTEGER REFERENCES folders(id) ON DELETE CASCADE,
    path TEXT NOT NULL UNIQUE,
    error_status TEXT,
    removed INTEGER NOT NULL DEFAULT 0,
    first_scanned_at INTEGER NOT NULL,
    last_scanned_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_folders_root ON folders(root_folder_id);
CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_folder_id);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_folder_id INTEGER NOT NULL REFERENCES root_folders(id) ON DELETE CASCADE,
    folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    path TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    fingerprint TEXT,
    fingerprint_algorithm TEXT,
    hashed_at INTEGER,
    error_status TEXT,
    removed INTEGER NOT NULL DEFAULT 0,
    first_scanned_at INTEGER NOT NULL,
    last_scanned_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_root ON files(root_folder_id);
CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
CREATE INDEX IF NOT EXISTS idx_files_fingerprint ON files(size, fingerprint, fingerprint_algorithm)
    WHERE fingerprint IS NOT NULL AND removed = 0;

CREATE TABLE IF NOT EXISTS scan_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_folder_id INTEGER NOT NULL REFERENCES root_folders(id) ON DELETE CASCADE,
    scan_mode TEXT NOT NULL CHECK (scan_mode IN ('all', 'folders', 'files')),
    status TEXT NOT NULL CHECK (status IN ('running', 'completed', 'interrupted')),
    current_folder_path TEXT,
    files_processed INTEGER NOT NULL DEFAULT 0,
    folders_processed INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_scan_state_active ON scan_state(root_folder_id, scan_mode)
    WHERE status IN ('running', 'interrupted');
";

/// Latest schema version.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |(v, _)| *v)
}

/// Apply any migrations newer than the catalog's recorded version.
///
/// # Errors
///
/// Returns [`CatalogError::Sqlite`] if a migration fails; that migration is
/// rolled back.
pub fn migrate(conn: &mut Connection) -> Result<i64, CatalogError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let current: i64 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    if current > latest_version() {
        return Err(CatalogError::SchemaTooNew {
            found: current,
            supported: latest_version(),
        });
    }

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, chrono::Utc::now().timestamp()],
        )?;
        tx.commit()?;
        log::debug!("Applied catalog migration {}", version);
    }

    Ok(latest_version())
}
