//! Duplicate set types and grouping helpers.
//!
//! A [`DuplicateSet`] is every live, error-free catalog file sharing the same
//! size, fingerprint and algorithm. Equality is decided by the fingerprint
//! alone; file contents are never compared byte for byte.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::FileRecord;
use crate::scanner::path_utils::{file_identity, member_key, FileIdentity};

/// One logical file in a duplicate set.
///
/// Catalog rows whose paths differ only by Unicode form or letter case, and
/// that resolve to the same on-disk file, are merged into one member; the
/// extra spellings are kept in `aliases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMember {
    /// Catalog id of the representative row
    pub file_id: i64,
    /// Root the file belongs to
    pub root_id: i64,
    /// Path of the representative row
    pub path: String,
    /// Other catalog paths naming the same file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Files with identical size and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSet {
    /// Size of each copy in bytes
    pub size: u64,
    /// Content fingerprint (lowercase hex)
    pub fingerprint: String,
    /// Algorithm that produced the fingerprint
    pub algorithm: String,
    /// Members ordered by path
    pub members: Vec<DuplicateMember>,
}

impl DuplicateSet {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if this set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Bytes occupied by all copies.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size.saturating_mul(self.members.len() as u64)
    }

    /// Bytes freed if only one copy were kept.
    #[must_use]
    pub fn recoverable_size(&self) -> u64 {
        self.size
            .saturating_mul(self.members.len().saturating_sub(1) as u64)
    }

    /// Path of the first member, used for path ordering.
    #[must_use]
    pub fn first_path(&self) -> &str {
        self.members.first().map_or("", |m| m.path.as_str())
    }
}

/// Aggregate figures over a list of duplicate sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateStats {
    /// Number of sets
    pub total_sets: usize,
    /// Files across all sets
    pub total_files: usize,
    /// Bytes occupied by all copies
    pub total_bytes: u64,
    /// Bytes freed if one copy per set were kept
    pub recoverable_bytes: u64,
}

impl DuplicateStats {
    /// Compute statistics for `sets`.
    #[must_use]
    pub fn from_sets(sets: &[DuplicateSet]) -> Self {
        sets.iter().fold(Self::default(), |mut stats, set| {
            stats.total_sets += 1;
            stats.total_files += set.len();
            stats.total_bytes = stats.total_bytes.saturating_add(set.total_size());
            stats.recoverable_bytes = stats
                .recoverable_bytes
                .saturating_add(set.recoverable_size());
            stats
        })
    }
}

/// Ordering of duplicate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Largest files first, then by fingerprint
    #[default]
    Size,
    /// Most copies first, then largest
    Count,
    /// By first member path
    Path,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Count => "count",
            Self::Path => "path",
        }
    }

    fn compare(self, a: &DuplicateSet, b: &DuplicateSet) -> Ordering {
        let by_size = || {
            b.size
                .cmp(&a.size)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
                .then_with(|| a.algorithm.cmp(&b.algorithm))
        };
        match self {
            Self::Size => by_size(),
            Self::Count => b.len().cmp(&a.len()).then_with(by_size),
            Self::Path => a.first_path().cmp(b.first_path()).then_with(by_size),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(Self::Size),
            "count" => Ok(Self::Count),
            "path" => Ok(Self::Path),
            other => Err(format!("Unknown sort order '{other}' (expected size, count or path)")),
        }
    }
}

/// Sort `sets` in place. The order is total, so output is deterministic.
pub fn sort_sets(sets: &mut [DuplicateSet], order: SortOrder) {
    sets.sort_by(|a, b| order.compare(a, b));
}

/// Merge rows that name the same file into single members, keeping the
/// first row (by path) as the representative.
///
/// Identity is read from the filesystem, see [`collapse_members_with`].
#[must_use]
pub fn collapse_members(rows: Vec<FileRecord>) -> Vec<DuplicateMember> {
    collapse_members_with(rows, file_identity)
}

/// Merge rows whose paths share a [`member_key`] and whose identities, as
/// reported by `identify`, are equal.
///
/// `identify` is only consulted for rows that share a key with an earlier
/// row. Rows whose identity is unknown stay separate, except on Windows,
/// where paths are case-insensitive and no identity is available.
pub fn collapse_members_with<F>(rows: Vec<FileRecord>, mut identify: F) -> Vec<DuplicateMember>
where
    F: FnMut(&str) -> Option<FileIdentity>,
{
    let mut members: Vec<DuplicateMember> = Vec::with_capacity(rows.len());
    // Lazily filled identity of each member
    let mut identities: Vec<Option<Option<FileIdentity>>> = Vec::with_capacity(rows.len());
    let mut index: HashMap<String, Vec<usize>> = HashMap::with_capacity(rows.len());

    for row in rows {
        let candidates = index.entry(member_key(&row.path)).or_default();

        let mut target = None;
        if !candidates.is_empty() {
            let identity = identify(&row.path);
            for &i in candidates.iter() {
                let existing =
                    *identities[i].get_or_insert_with(|| identify(&members[i].path));
                if same_file(existing, identity) {
                    target = Some(i);
                    break;
                }
            }
        }

        match target {
            Some(i) => members[i].aliases.push(row.path),
            None => {
                candidates.push(members.len());
                identities.push(None);
                members.push(DuplicateMember {
                    file_id: row.id,
                    root_id: row.root_id,
                    path: row.path,
                    aliases: Vec::new(),
                });
            }
        }
    }
    members
}

fn same_file(a: Option<FileIdentity>, b: Option<FileIdentity>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => cfg!(windows),
        _ => false,
    }
}
