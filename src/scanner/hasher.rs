//! Streaming content fingerprints.
//!
//! # Overview
//!
//! [`Hasher`] reads a file in fixed [`CHUNK_SIZE`] chunks and feeds them to
//! the configured [`HashAlgorithm`]. The shutdown flag is checked between
//! chunks, so cancelling a scan never waits for a large file to finish.
//!
//! Fingerprints are lowercase hex strings. Two files are only comparable if
//! their fingerprints were produced by the same algorithm, so the algorithm
//! travels with the digest in [`Fingerprint`].
//!
//! # Example
//!
//! ```no_run
//! use dupescan::scanner::{HashAlgorithm, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new(HashAlgorithm::Sha256);
//! let fingerprint = hasher.hash_file(Path::new("some_file.txt")).unwrap();
//! println!("{} {}", fingerprint.algorithm, fingerprint.value);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use super::HashError;

/// Read buffer size for streaming hashes (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Supported content hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 (32-byte digest)
    Sha256,
    /// SHA-512 (64-byte digest)
    #[default]
    Sha512,
    /// SHA3-256 (32-byte digest)
    #[serde(rename = "sha3-256")]
    Sha3_256,
    /// BLAKE3 (32-byte digest)
    Blake3,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 4] = [Self::Sha256, Self::Sha512, Self::Sha3_256, Self::Blake3];

    /// Name stored alongside each fingerprint in the catalog.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Sha3_256 => "sha3-256",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of the hex-encoded digest.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 | Self::Sha3_256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown algorithm name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported hash algorithm '{0}' (expected one of: sha256, sha512, sha3-256, blake3)")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            "sha3-256" | "sha3_256" | "sha3" => Ok(Self::Sha3_256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// A content digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Algorithm used to compute the digest
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

/// Incremental digest state for one file.
enum DigestState {
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Sha3_256(sha3::Sha3_256),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Sha3_256 => Self::Sha3_256(sha3::Sha3_256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Sha3_256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => to_hex(&h.finalize()),
            Self::Sha512(h) => to_hex(&h.finalize()),
            Self::Sha3_256(h) => to_hex(&h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Convert digest bytes to a lowercase hex string.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Streaming file hasher.
///
/// A single `Hasher` is shared by all hash workers; it holds no per-file state.
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a hasher for the given algorithm.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag checked between chunks.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The algorithm this hasher produces.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Fingerprint the contents of a file.
    ///
    /// # Errors
    ///
    /// - [`HashError::NotFound`] if the file vanished
    /// - [`HashError::PermissionDenied`] if it cannot be opened
    /// - [`HashError::Interrupted`] if shutdown was requested mid-read
    /// - [`HashError::Io`] for any other read failure
    pub fn hash_file(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let file = File::open(path).map_err(|e| map_io_error(path, e))?;
        self.hash_reader(file, path)
    }

    /// Fingerprint everything readable from `reader`.
    ///
    /// `path` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// See [`Hasher::hash_file`].
    pub fn hash_reader<R: Read>(&self, mut reader: R, path: &Path) -> Result<Fingerprint, HashError> {
        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }

            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(path, e)),
            };
            state.update(&buffer[..n]);
        }

        Ok(Fingerprint {
            algorithm: self.algorithm,
            value: state.finalize_hex(),
        })
    }

    /// Fingerprint an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> Fingerprint {
        let mut state = DigestState::new(self.algorithm);
        state.update(data);
        Fingerprint {
            algorithm: self.algorithm,
            value: state.finalize_hex(),
        }
    }
}

fn map_io_error(path: &Path, error: std::io::Error) -> HashError {
    match error.kind() {
        ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
