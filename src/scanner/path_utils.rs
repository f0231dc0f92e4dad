//! Path normalization utilities.
//!
//! Paths are stored in the catalog as the filesystem reports them, after
//! lexical cleaning, in a reversible text encoding (see [`storage_path`]).
//! Comparison between catalog entries that may refer to the same file uses a
//! separate, lossy key: NFC-normalized and lowercased. Rows sharing that key
//! are only merged when [`file_identity`] shows they are one on-disk file.
//!
//! # Background
//!
//! macOS uses NFD (Decomposed) normalization for file paths, while Windows
//! and Linux typically use NFC (Composed) normalization. The same visual
//! filename can therefore have different byte representations:
//!
//! - NFC: `café.txt` - 'é' is U+00E9 (single code point)
//! - NFD: `café.txt` - 'e' U+0065 + combining acute accent U+0301
//!
//! # Example
//!
//! ```
//! use dupescan::scanner::path_utils::{member_key, normalize_path_str};
//!
//! let nfc = "café.txt";
//! let nfd = "cafe\u{0301}.txt";
//!
//! assert_eq!(normalize_path_str(nfc), normalize_path_str(nfd));
//! assert_eq!(member_key("/Data/CAFÉ.txt"), member_key("/data/cafe\u{0301}.txt"));
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to NFC (Composed) form.
///
/// # Example
///
/// ```
/// use dupescan::scanner::path_utils::normalize_path_str;
///
/// let nfd = "cafe\u{0301}.txt";
/// assert_eq!(normalize_path_str(nfd), "café.txt");
/// ```
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Lexically clean a path: drop `.` components and resolve `..` against
/// preceding normal components.
///
/// The filesystem is never consulted, so symlinks are not resolved.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use dupescan::scanner::path_utils::clean_path;
///
/// assert_eq!(clean_path(Path::new("/a/./b/../c/")), PathBuf::from("/a/c"));
/// ```
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Resolve a user-supplied root path to the absolute, cleaned form used as
/// its catalog identity.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn absolute_root(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(clean_path(&absolute))
}

/// The string form a path takes in the catalog.
///
/// On Unix, valid UTF-8 is kept as is except that `\` is doubled, and every
/// byte outside valid UTF-8 becomes `\xNN`. Distinct paths therefore never
/// share a catalog string, and [`fs_path`] recovers the original bytes.
///
/// # Example
///
/// ```
/// # #[cfg(unix)] {
/// use std::ffi::OsStr;
/// use std::os::unix::ffi::OsStrExt;
/// use std::path::Path;
/// use dupescan::scanner::path_utils::{fs_path, storage_path};
///
/// let raw = Path::new(OsStr::from_bytes(b"/data/a\xff"));
/// assert_eq!(storage_path(raw), "/data/a\\xff");
/// assert_eq!(fs_path(&storage_path(raw)), raw);
/// # }
/// ```
#[cfg(unix)]
#[must_use]
pub fn storage_path(path: &Path) -> String {
    use std::os::unix::ffi::OsStrExt;

    let bytes = path.as_os_str().as_bytes();
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            if c == '\\' {
                out.push_str("\\\\");
            } else {
                out.push(c);
            }
        }
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{byte:02x}"));
        }
    }
    out
}

/// The string form a path takes in the catalog.
///
/// Paths that are not valid Unicode are stored lossily and logged.
#[cfg(not(unix))]
#[must_use]
pub fn storage_path(path: &Path) -> String {
    match path.to_str() {
        Some(s) => s.to_owned(),
        None => {
            log::warn!("Path is not valid Unicode and is stored lossily: {}", path.display());
            path.to_string_lossy().into_owned()
        }
    }
}

/// Turn a catalog path string back into the filesystem path it encodes.
#[cfg(unix)]
#[must_use]
pub fn fs_path(stored: &str) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let bytes = stored.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            match bytes.get(i + 1) {
                Some(b'\\') => {
                    out.push(b'\\');
                    i += 2;
                    continue;
                }
                Some(b'x') => {
                    if let Some(byte) = bytes
                        .get(i + 2..i + 4)
                        .and_then(|hex| std::str::from_utf8(hex).ok())
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

/// Turn a catalog path string back into the filesystem path it encodes.
#[cfg(not(unix))]
#[must_use]
pub fn fs_path(stored: &str) -> PathBuf {
    PathBuf::from(stored)
}

/// Key used to collapse catalog entries that name the same file with a
/// different Unicode form or letter case.
#[must_use]
pub fn member_key(path: &str) -> String {
    normalize_path_str(path)
        .chars()
        .flat_map(char::to_lowercase)
        .collect()
}

/// Device and inode of an on-disk file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

/// Identity of the file a catalog path names, following symlinks.
///
/// Returns `None` if the file cannot be stat'ed or the platform exposes no
/// inode numbers.
#[cfg(unix)]
#[must_use]
pub fn file_identity(stored: &str) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(fs_path(stored)).ok()?;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

/// Identity of the file a catalog path names. Not available on this platform.
#[cfg(not(unix))]
#[must_use]
pub fn file_identity(_stored: &str) -> Option<FileIdentity> {
    None
}

/// Returns `true` if `path` equals `prefix` or lies beneath it.
#[must_use]
pub fn is_within(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}
