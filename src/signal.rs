//! Signal handling for graceful shutdown.
//!
//! This module provides centralized Ctrl+C / SIGTERM handling. It uses an
//! `AtomicBool` flag that is shared with the walker, the hash workers, and
//! the scanner so a scan can stop and save its checkpoint as interrupted.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dupescan::signal::install_handler;
//! use std::time::Duration;
//!
//! let handler = install_handler(Duration::from_secs(5)).expect("Failed to install signal handler");
//!
//! // Get the flag to pass to the scanner
//! let shutdown_flag = handler.get_flag();
//! ```
//!
//! # Grace period
//!
//! When a signal is received:
//! - The shutdown flag is set to `true`
//! - A message "Interrupted. Saving checkpoint..." is printed to stderr
//! - If the process is still running when the grace period ends, it exits
//!   with code 130 (128 + SIGINT) without waiting for the checkpoint flush
//! - A second signal exits immediately

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Default time allowed for the checkpoint flush after a signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Centralized shutdown handler for graceful application termination.
///
/// This struct wraps an `AtomicBool` flag that is set when a termination
/// signal is received. `ShutdownHandler` is `Send` and `Sync`.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    /// The shared atomic flag indicating shutdown was requested.
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a new shutdown handler with the flag initially set to `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the shutdown flag for passing to the scanner.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dupescan::signal::ShutdownHandler;
    /// use dupescan::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let handler = ShutdownHandler::new();
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default())
    ///     .with_shutdown_flag(handler.get_flag());
    /// ```
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reset the shutdown flag to `false`.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C / SIGTERM handler that sets the shutdown flag.
///
/// Call this once, early, before any long-running operation begins. Later
/// calls return the installed handler with its flag reset, so tests that
/// run the application several times in one process keep working.
///
/// `grace` bounds how long the process may keep running after the first
/// signal.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the handler cannot be
/// registered for a reason other than one already being registered.
pub fn install_handler(grace: Duration) -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    let result = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            let _ = writeln!(std::io::stderr(), "\nForced exit.");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Saving checkpoint...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");

        let spawned = thread::Builder::new()
            .name("shutdown-grace".to_string())
            .spawn(move || {
                thread::sleep(grace);
                log::warn!("Checkpoint flush exceeded {:?}; exiting", grace);
                std::process::exit(EXIT_CODE_INTERRUPTED);
            });
        if spawned.is_err() {
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
    });

    match result {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Signal handler already registered, using unhooked handler");
            let fallback = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new);
            fallback.reset();
            Ok(fallback.clone())
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a handler without installing any signal hooks.
///
/// # Example
///
/// ```
/// use dupescan::signal::create_handler;
/// let handler = create_handler();
/// assert!(!handler.is_shutdown_requested());
/// ```
#[must_use]
pub fn create_handler() -> ShutdownHandler {
    ShutdownHandler::new()
}
