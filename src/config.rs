//! Layered application configuration.
//!
//! Values are merged in increasing priority:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config PATH`, or `config.toml` in the platform config dir)
//! 3. Environment variables prefixed with `DUPESCAN_`
//! 4. Command-line flags
//!
//! # Example
//!
//! ```toml
//! hash_algorithm = "blake3"
//! workers = 4
//! shutdown_grace_secs = 10
//! ```
//!
//! The same keys can be set through the environment, e.g.
//! `DUPESCAN_HASH_ALGORITHM=sha256`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::pool::{PoolConfig, DEFAULT_QUEUE_DEPTH_FACTOR};
use crate::scanner::{HashAlgorithm, UnsupportedAlgorithm};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "DUPESCAN_";

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Name of the default catalog database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "catalog.db";

/// Errors from loading or interpreting configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configured hash algorithm is not supported.
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),

    /// An explicitly named configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),

    /// A provider failed or a value had the wrong type.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// No home directory could be determined for default paths.
    #[error("Could not determine platform directories; pass --database explicitly")]
    NoProjectDirs,
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog database file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Fingerprint algorithm for newly hashed files
    pub hash_algorithm: String,
    /// Hash workers (0 = one per CPU)
    pub workers: usize,
    /// Queue slots per hash worker
    pub queue_depth_factor: usize,
    /// Progress refresh interval in milliseconds
    pub progress_interval_ms: u64,
    /// Seconds allowed for the checkpoint flush after a termination signal
    pub shutdown_grace_secs: u64,
    /// Whether newly registered roots follow symbolic links
    pub traverse_links: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            hash_algorithm: HashAlgorithm::default().name().to_string(),
            workers: 0,
            queue_depth_factor: DEFAULT_QUEUE_DEPTH_FACTOR,
            progress_interval_ms: 100,
            shutdown_grace_secs: 5,
            traverse_links: false,
        }
    }
}

/// Command-line values that override configuration. Unset fields leave the
/// lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Config {
    /// Build the provider chain without extracting it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `config_file` is given but
    /// does not exist.
    pub fn figment(config_file: Option<&Path>, overrides: &Overrides) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingFile(path.to_path_buf()));
                }
                log::debug!("Loading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_config_file() {
                    if path.is_file() {
                        log::debug!("Loading configuration from {}", path.display());
                        figment = figment.merge(Toml::file(path));
                    }
                }
            }
        }

        Ok(figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides)))
    }

    /// Load and validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer cannot be read or the result holds
    /// an unsupported algorithm name.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(config_file, overrides)?
            .extract()
            .map_err(Box::new)?;
        config.algorithm()?;
        Ok(config)
    }

    /// The configured fingerprint algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedAlgorithm`] for unknown names.
    pub fn algorithm(&self) -> Result<HashAlgorithm, ConfigError> {
        Ok(self.hash_algorithm.parse()?)
    }

    /// Worker pool sizing derived from `workers` and `queue_depth_factor`.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::with_workers(self.workers).with_queue_depth_factor(self.queue_depth_factor)
    }

    /// Grace period for the checkpoint flush after a signal.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Progress refresh interval.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// The catalog database path, falling back to the platform data dir.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProjectDirs`] if no path is configured and
    /// the platform directories cannot be determined.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
            .ok_or(ConfigError::NoProjectDirs)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "dupescan")
}

/// Path of the configuration file read when `--config` is not given.
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
