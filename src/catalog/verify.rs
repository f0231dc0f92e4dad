//! Catalog integrity checks.

use rusqlite::{params, Connection};
use serde::Serialize;

use super::database::{query_root_stats, to_i64, to_u64};
use super::{Catalog, CatalogError};
use crate::scanner::HashAlgorithm;

/// Outcome of one integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Short machine-friendly name
    pub name: &'static str,
    /// Problems found
    pub issues: u64,
    /// Problems fixed (always 0 without `repair`)
    pub repaired: u64,
    /// Human-readable notes, one per problem kind or root
    pub details: Vec<String>,
}

impl CheckResult {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            issues: 0,
            repaired: 0,
            details: Vec::new(),
        }
    }

    /// Problems found but not fixed.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.issues.saturating_sub(self.repaired)
    }
}

/// Results of all integrity checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    /// Total problems found.
    #[must_use]
    pub fn total_issues(&self) -> u64 {
        self.checks.iter().map(|c| c.issues).sum()
    }

    /// Total problems left after repair.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.checks.iter().map(CheckResult::outstanding).sum()
    }

    /// Returns `true` if nothing is left to fix.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outstanding() == 0
    }
}

impl Catalog {
    /// Check catalog consistency, fixing what can be fixed when `repair` is set.
    ///
    /// Mixed fingerprint algorithms are reported but never repaired; they
    /// only go away when the affected files are re-fingerprinted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] on database failure. Repairs run in
    /// one transaction and are rolled back on failure.
    pub fn verify(&self, repair: bool) -> Result<VerifyReport, CatalogError> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let checks = vec![
                check_orphan_files(&tx, repair)?,
                check_removed_cascade(&tx, repair)?,
                check_partial_fingerprints(&tx, repair)?,
                check_root_stats(&tx, repair)?,
                check_mixed_algorithms(&tx)?,
            ];
            tx.commit()?;
            Ok(VerifyReport { checks })
        })
    }
}

fn count(conn: &Connection, sql: &str) -> Result<u64, CatalogError> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(to_u64(n))
}

fn check_orphan_files(conn: &Connection, repair: bool) -> Result<CheckResult, CatalogError> {
    const FILTER: &str = "removed = 0 AND (folder_id IS NULL
                          OR folder_id NOT IN (SELECT id FROM folders))";
    let mut result = CheckResult::new("orphan_files");
    result.issues = count(conn, &format!("SELECT COUNT(*) FROM files WHERE {FILTER}"))?;
    if result.issues > 0 {
        result
            .details
            .push(format!("{} active files have no folder", result.issues));
        if repair {
            let fixed = conn.execute(&format!("UPDATE files SET removed = 1 WHERE {FILTER}"), [])?;
            result.repaired = fixed as u64;
        }
    }
    Ok(result)
}

fn check_removed_cascade(conn: &Connection, repair: bool) -> Result<CheckResult, CatalogError> {
    const FILES: &str = "removed = 0 AND folder_id IN (SELECT id FROM folders WHERE removed = 1)";
    const FOLDERS: &str =
        "removed = 0 AND parent_folder_id IN (SELECT id FROM folders WHERE removed = 1)";
    let mut result = CheckResult::new("removed_cascade");

    let files = count(conn, &format!("SELECT COUNT(*) FROM files WHERE {FILES}"))?;
    let folders = count(conn, &format!("SELECT COUNT(*) FROM folders WHERE {FOLDERS}"))?;
    result.issues = files + folders;
    if files > 0 {
        result
            .details
            .push(format!("{files} active files inside removed folders"));
    }
    if folders > 0 {
        result
            .details
            .push(format!("{folders} active folders inside removed folders"));
    }

    if repair && result.issues > 0 {
        // Folders first, repeated until the flag has reached every descendant
        loop {
            let changed = conn.execute(&format!("UPDATE folders SET removed = 1 WHERE {FOLDERS}"), [])?;
            if changed == 0 {
                break;
            }
            result.repaired += changed as u64;
        }
        let changed = conn.execute(&format!("UPDATE files SET removed = 1 WHERE {FILES}"), [])?;
        result.repaired += changed as u64;
        // Descendants below the first level count as repairs but not as issues
        result.repaired = result.repaired.min(result.issues);
    }
    Ok(result)
}

fn check_partial_fingerprints(conn: &Connection, repair: bool) -> Result<CheckResult, CatalogError> {
    const FILTER: &str = "(fingerprint IS NULL) <> (fingerprint_algorithm IS NULL)";
    let mut result = CheckResult::new("partial_fingerprints");
    result.issues = count(conn, &format!("SELECT COUNT(*) FROM files WHERE {FILTER}"))?;
    if result.issues > 0 {
        result.details.push(format!(
            "{} files have a fingerprint without an algorithm or the reverse",
            result.issues
        ));
        if repair {
            let fixed = conn.execute(
                &format!(
                    "UPDATE files SET fingerprint = NULL, fingerprint_algorithm = NULL,
                                      hashed_at = NULL
                     WHERE {FILTER}"
                ),
                [],
            )?;
            result.repaired = fixed as u64;
        }
    }
    Ok(result)
}

fn check_root_stats(conn: &Connection, repair: bool) -> Result<CheckResult, CatalogError> {
    let mut result = CheckResult::new("root_stats");
    let roots: Vec<(i64, String, i64, i64, i64)> = {
        let mut stmt = conn.prepare(
            "SELECT id, path, folder_count, file_count, total_size FROM root_folders ORDER BY path",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    for (id, path, folders, files, size) in roots {
        let actual = query_root_stats(conn, id)?;
        let stored = (to_u64(folders), to_u64(files), to_u64(size));
        if stored == (actual.folder_count, actual.file_count, actual.total_size) {
            continue;
        }
        result.issues += 1;
        result.details.push(format!(
            "{path}: stored {}/{}/{} folders/files/bytes, actual {}/{}/{}",
            stored.0, stored.1, stored.2, actual.folder_count, actual.file_count, actual.total_size
        ));
        if repair {
            conn.execute(
                "UPDATE root_folders SET folder_count = ?2, file_count = ?3, total_size = ?4
                 WHERE id = ?1",
                params![
                    id,
                    to_i64(actual.folder_count),
                    to_i64(actual.file_count),
                    to_i64(actual.total_size)
                ],
            )?;
            result.repaired += 1;
        }
    }
    Ok(result)
}

fn check_mixed_algorithms(conn: &Connection) -> Result<CheckResult, CatalogError> {
    let mut result = CheckResult::new("mixed_algorithms");
    let mut stmt = conn.prepare(
        "SELECT r.path, f.fingerprint_algorithm, COUNT(*)
         FROM files f JOIN root_folders r ON r.id = f.root_folder_id
         WHERE f.removed = 0 AND f.fingerprint_algorithm IS NOT NULL
         GROUP BY r.path, f.fingerprint_algorithm
         ORDER BY r.path, f.fingerprint_algorithm",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut current: Option<(String, Vec<String>)> = None;

    for (root, algorithm, files) in rows {
        if algorithm.parse::<HashAlgorithm>().is_err() {
            result.issues += 1;
            result
                .details
                .push(format!("{root}: {files} files use unsupported algorithm '{algorithm}'"));
        }
        let label = format!("{algorithm} ({files})");
        match current.as_mut() {
            Some((name, algorithms)) if *name == root => algorithms.push(label),
            _ => {
                flush_root_algorithms(current.take(), &mut result);
                current = Some((root, vec![label]));
            }
        }
    }
    flush_root_algorithms(current.take(), &mut result);
    Ok(result)
}

fn flush_root_algorithms(entry: Option<(String, Vec<String>)>, result: &mut CheckResult) {
    if let Some((root, algorithms)) = entry {
        if algorithms.len() > 1 {
            result.issues += 1;
            result
                .details
                .push(format!("{root}: fingerprints use {}", algorithms.join(", ")));
        }
    }
}
