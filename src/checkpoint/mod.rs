//! Checkpoint module for resumable scans.
//!
//! A checkpoint is a [`ScanState`] row in the catalog recording how far a
//! scan of one root in one [`ScanMode`] has progressed. At most one active
//! (running or interrupted) checkpoint exists per root and mode.
//!
//! # Lifecycle
//!
//! ```text
//!            start            interrupt
//!   (none) ───────► running ───────────► interrupted
//!                     │  ▲                    │
//!            complete │  └──── resume ────────┘
//!                     ▼
//!                 completed   (never mutated again)
//! ```
//!
//! # Architecture
//!
//! * [`state`]: Serializable checkpoint models.
//! * [`manager`]: [`CheckpointManager`] driving transitions through the catalog.

pub mod manager;
pub mod state;

pub use manager::{CheckpointError, CheckpointManager};
pub use state::{ParseStateError, ScanMode, ScanState, ScanStatus};
