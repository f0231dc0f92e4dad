//! Exit codes and machine-readable error reports for the `dupescan` binary.

use serde::Serialize;

use crate::checkpoint::CheckpointError;
use crate::scanner::OrchestratorError;

/// Process exit codes.
///
/// - 0: Success (command completed; duplicates listed if any were asked for)
/// - 1: General error (unexpected failure, store failure, bad configuration)
/// - 2: No duplicates found
/// - 3: Scan completed, but some files or folders were recorded with errors
/// - 130: Interrupted by a termination signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Command completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// A duplicate query returned no sets.
    NoDuplicates = 2,
    /// A scan completed with per-entity errors.
    PartialSuccess = 3,
    /// A scan was interrupted (Ctrl+C / SIGTERM).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDuplicates => "DS002",
            Self::PartialSuccess => "DS003",
            Self::Interrupted => "DS130",
        }
    }

    /// Pick the exit code for an error returned by `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let interrupted = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<OrchestratorError>(),
                Some(OrchestratorError::Interrupted)
            )
        });
        if interrupted {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
    /// Whether another scan already holds the checkpoint
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub scan_in_progress: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        let scan_in_progress = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<CheckpointError>(),
                Some(CheckpointError::AlreadyActive { .. })
            )
        });
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
            scan_in_progress,
        }
    }
}
