//! Checkpoint transitions backed by the catalog.

use std::sync::Arc;

use crate::catalog::{Catalog, CatalogError};

use super::state::{ScanMode, ScanState, ScanStatus};

/// Errors raised by checkpoint transitions.
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    /// The catalog failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Another scan of this root and mode is already active.
    #[error("A {mode} scan of root {root_id} is already active; resume it or restart")]
    AlreadyActive {
        /// Root id
        root_id: i64,
        /// Scan mode
        mode: ScanMode,
    },

    /// No checkpoint has been started or resumed.
    #[error("No checkpoint has been started")]
    NotStarted,

    /// The checkpoint is no longer running.
    #[error("Checkpoint {0} is not running")]
    NotRunning(i64),
}

/// Drives the checkpoint of one root and scan mode.
///
/// All state lives in the catalog; the manager only caches the row it is
/// working on.
#[derive(Debug)]
pub struct CheckpointManager {
    catalog: Arc<Catalog>,
    root_id: i64,
    mode: ScanMode,
    state: Option<ScanState>,
}

impl CheckpointManager {
    /// Create a manager for `root_id` in `mode`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, root_id: i64, mode: ScanMode) -> Self {
        Self {
            catalog,
            root_id,
            mode,
            state: None,
        }
    }

    /// The checkpoint being driven, if any.
    #[must_use]
    pub fn current(&self) -> Option<&ScanState> {
        self.state.as_ref()
    }

    /// Create a new running checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::AlreadyActive`] if a running or interrupted
    /// checkpoint exists; no row is created in that case.
    pub fn start(&mut self) -> Result<&ScanState, CheckpointError> {
        let state = match self.catalog.insert_scan_state(self.root_id, self.mode) {
            Ok(state) => state,
            Err(CatalogError::ActiveScanExists { root_id, mode }) => {
                return Err(CheckpointError::AlreadyActive { root_id, mode })
            }
            Err(e) => return Err(e.into()),
        };
        log::debug!("Started {} checkpoint {} for root {}", self.mode, state.id, self.root_id);
        Ok(self.state.insert(state))
    }

    /// Adopt the active checkpoint, if one exists, and mark it running.
    ///
    /// A checkpoint still marked running belongs to a process that exited
    /// without flushing; it is adopted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Catalog`] on database failure.
    pub fn resume(&mut self) -> Result<Option<&ScanState>, CheckpointError> {
        let Some(mut state) = self.catalog.active_scan_state(self.root_id, self.mode)? else {
            return Ok(None);
        };

        match state.status {
            ScanStatus::Interrupted => {
                if !self.catalog.transition_scan_state(
                    state.id,
                    ScanStatus::Interrupted,
                    ScanStatus::Running,
                )? {
                    return Err(CheckpointError::NotRunning(state.id));
                }
                state.status = ScanStatus::Running;
            }
            ScanStatus::Running => {
                log::warn!(
                    "Checkpoint {} was left running by a previous process; resuming it",
                    state.id
                );
            }
            ScanStatus::Completed => return Ok(None),
        }

        log::info!(
            "Resuming {} scan from checkpoint {} ({} folders, {} files done)",
            self.mode,
            state.id,
            state.folders_processed,
            state.files_processed
        );
        Ok(Some(&*self.state.insert(state)))
    }

    /// Record that `current_folder` has been fully registered.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotStarted`] before start or resume, and
    /// [`CheckpointError::NotRunning`] once the checkpoint has been completed
    /// or interrupted.
    pub fn save(
        &mut self,
        current_folder: &str,
        folders_processed: u64,
        files_processed: u64,
    ) -> Result<(), CheckpointError> {
        let state = self.state.as_mut().ok_or(CheckpointError::NotStarted)?;
        match self.catalog.update_scan_progress(
            state.id,
            current_folder,
            folders_processed,
            files_processed,
        ) {
            Ok(()) => {}
            Err(CatalogError::ScanStateNotRunning(id)) => return Err(CheckpointError::NotRunning(id)),
            Err(e) => return Err(e.into()),
        }
        state.current_folder = Some(current_folder.to_string());
        state.folders_processed = folders_processed;
        state.files_processed = files_processed;
        Ok(())
    }

    /// Mark the checkpoint completed. This is irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotStarted`] or [`CheckpointError::NotRunning`]
    /// if there is no running checkpoint.
    pub fn complete(&mut self) -> Result<ScanState, CheckpointError> {
        let id = self.state.as_ref().ok_or(CheckpointError::NotStarted)?.id;
        if !self
            .catalog
            .transition_scan_state(id, ScanStatus::Running, ScanStatus::Completed)?
        {
            return Err(CheckpointError::NotRunning(id));
        }
        self.state = None;
        let state = self
            .catalog
            .get_scan_state(id)?
            .ok_or(CheckpointError::NotRunning(id))?;
        log::debug!("Completed checkpoint {}", id);
        Ok(state)
    }

    /// Mark the running checkpoint interrupted so the next scan can resume it.
    ///
    /// Returns `false` if there was nothing to interrupt.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Catalog`] on database failure.
    pub fn interrupt(&mut self) -> Result<bool, CheckpointError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(false);
        };
        let changed =
            self.catalog
                .transition_scan_state(state.id, ScanStatus::Running, ScanStatus::Interrupted)?;
        if changed {
            state.status = ScanStatus::Interrupted;
            log::info!("Checkpoint {} saved as interrupted", state.id);
        }
        Ok(changed)
    }

    /// Delete every checkpoint for this root and mode. Catalog rows are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Catalog`] on database failure.
    pub fn clear(&mut self) -> Result<u64, CheckpointError> {
        self.state = None;
        let deleted = self.catalog.delete_scan_states(self.root_id, self.mode)?;
        if deleted > 0 {
            log::debug!("Cleared {} {} checkpoint(s) for root {}", deleted, self.mode, self.root_id);
        }
        Ok(deleted)
    }
}
