//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Grouping cataloged files by (size, fingerprint, algorithm)
//! - Collapsing catalog rows that name the same file
//! - Ordering sets and computing recoverable space

pub mod finder;
pub mod groups;

pub use finder::{DetectorError, DuplicateDetector, DuplicateQuery, DuplicateReport};
pub use groups::{DuplicateMember, DuplicateSet, DuplicateStats, SortOrder};
