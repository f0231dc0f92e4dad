//! Duplicate set queries over the catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogError};
use crate::scanner::path_utils::absolute_root;

use super::groups::{collapse_members, sort_sets, DuplicateSet, DuplicateStats, SortOrder};

/// Errors returned by the duplicate detector.
#[derive(thiserror::Error, Debug)]
pub enum DetectorError {
    /// A set needs at least two members.
    #[error("Minimum count must be at least 2, got {0}")]
    InvalidMinCount(usize),

    /// The root filter does not name a registered root.
    #[error("Root folder not registered: {0}")]
    UnknownRoot(PathBuf),

    /// The catalog query failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Parameters of a duplicate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateQuery {
    /// Smallest member count for a set (at least 2)
    pub min_count: usize,
    /// Smallest file size in bytes
    pub min_size: u64,
    /// Only consider files under this registered root
    pub root: Option<PathBuf>,
    /// Ordering of the result
    pub sort: SortOrder,
}

impl Default for DuplicateQuery {
    fn default() -> Self {
        Self {
            min_count: 2,
            min_size: 0,
            root: None,
            sort: SortOrder::Size,
        }
    }
}

impl DuplicateQuery {
    /// Set the minimum member count.
    #[must_use]
    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Restrict the query to one registered root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the result ordering.
    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Duplicate sets and their aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DuplicateReport {
    /// Sets in the requested order
    pub sets: Vec<DuplicateSet>,
    /// Totals over `sets`
    pub stats: DuplicateStats,
}

/// Groups cataloged files into duplicate sets.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    catalog: Arc<Catalog>,
}

impl DuplicateDetector {
    /// Create a detector over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Return the duplicate sets matching `query`, ordered by `query.sort`.
    ///
    /// Candidate groups are counted by the catalog; members are then fetched
    /// per group and merged by [`collapse_members`]. A group that falls below
    /// `min_count` after merging is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::InvalidMinCount`] if `min_count < 2`,
    /// [`DetectorError::UnknownRoot`] if the root filter is not registered,
    /// and [`DetectorError::Catalog`] if a query fails.
    pub fn group_duplicates(&self, query: &DuplicateQuery) -> Result<Vec<DuplicateSet>, DetectorError> {
        if query.min_count < 2 {
            return Err(DetectorError::InvalidMinCount(query.min_count));
        }
        let root_id = match &query.root {
            Some(path) => Some(self.resolve_root(path)?),
            None => None,
        };

        let groups = self.catalog.fingerprint_groups(
            query.min_size,
            query.min_count as u64,
            root_id,
        )?;
        log::debug!("{} candidate duplicate groups", groups.len());

        let mut sets = Vec::with_capacity(groups.len());
        for group in groups {
            let members = collapse_members(self.catalog.group_members(&group, root_id)?);
            if members.len() < query.min_count {
                log::debug!(
                    "Group {} collapsed to {} member(s); dropped",
                    group.fingerprint,
                    members.len()
                );
                continue;
            }
            sets.push(DuplicateSet {
                size: group.size,
                fingerprint: group.fingerprint,
                algorithm: group.algorithm,
                members,
            });
        }

        sort_sets(&mut sets, query.sort);
        Ok(sets)
    }

    /// [`group_duplicates`](Self::group_duplicates) plus aggregate statistics.
    ///
    /// # Errors
    ///
    /// See [`group_duplicates`](Self::group_duplicates).
    pub fn find_duplicates(&self, query: &DuplicateQuery) -> Result<DuplicateReport, DetectorError> {
        let sets = self.group_duplicates(query)?;
        let stats = DuplicateStats::from_sets(&sets);
        log::info!(
            "Found {} duplicate sets ({} files, {} recoverable bytes)",
            stats.total_sets,
            stats.total_files,
            stats.recoverable_bytes
        );
        Ok(DuplicateReport { sets, stats })
    }

    fn resolve_root(&self, path: &Path) -> Result<i64, DetectorError> {
        let resolved = absolute_root(path).unwrap_or_else(|_| path.to_path_buf());
        self.catalog
            .get_root_by_path(&resolved)?
            .map(|root| root.id)
            .ok_or(DetectorError::UnknownRoot(resolved))
    }
}
