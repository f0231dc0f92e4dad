//! Data structures for scan checkpoints.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which phases a scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Traverse, register folders and files, and fingerprint new files.
    #[default]
    All,
    /// Traverse and register folders only.
    Folders,
    /// Re-list cataloged folders and fingerprint anything not yet fingerprinted.
    Files,
}

impl ScanMode {
    /// Name stored in the catalog.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Folders => "folders",
            Self::Files => "files",
        }
    }
}

/// Lifecycle state of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// The scan is in progress.
    Running,
    /// The scan finished; the checkpoint is final.
    Completed,
    /// The scan stopped early and can be resumed.
    Interrupted,
}

impl ScanStatus {
    /// Name stored in the catalog.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    /// Running and interrupted checkpoints are active.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}

/// Error returned when a stored mode or status name is not recognized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseStateError {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

impl FromStr for ScanMode {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "folders" => Ok(Self::Folders),
            "files" => Ok(Self::Files),
            _ => Err(ParseStateError {
                kind: "scan mode",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "interrupted" => Ok(Self::Interrupted),
            _ => Err(ParseStateError {
                kind: "scan status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanState {
    /// Catalog row id
    pub id: i64,
    /// Root being scanned
    pub root_id: i64,
    /// Scan mode
    pub mode: ScanMode,
    /// Last folder fully processed
    pub current_folder: Option<String>,
    /// When the scan started
    pub started_at: DateTime<Utc>,
    /// Last progress save
    pub updated_at: DateTime<Utc>,
    /// When the scan completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle state
    pub status: ScanStatus,
    /// Files registered so far
    pub files_processed: u64,
    /// Folders registered so far
    pub folders_processed: u64,
}

impl ScanState {
    /// Returns `true` while the checkpoint may still change.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns `true` if the checkpoint can be resumed.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.status.is_active()
    }
}
