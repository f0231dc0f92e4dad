use super::fixtures::{is_root_user, set_mode, Fixture};
use dupescan::checkpoint::ScanMode;
use dupescan::duplicates::{DuplicateDetector, DuplicateQuery};
use dupescan::scanner::path_utils::storage_path;
use std::sync::Arc;

#[test]
fn test_unreadable_folder_recorded_and_scan_continues() {
    if is_root_user() {
        eprintln!("Skipping: permissions are not enforced for this user");
        return;
    }
    let fx = Fixture::new();
    fx.write("ok/a.txt", b"same");
    fx.write("ok/b.txt", b"same");
    let locked = fx.write("locked/secret.txt", b"hidden");
    let locked_dir = locked.parent().unwrap().to_path_buf();
    fx.register();
    set_mode(&locked_dir, 0o000);

    let result = fx.scanner(ScanMode::All).scan(false);
    set_mode(&locked_dir, 0o755);
    let summary = result.unwrap();

    assert_eq!(summary.folder_errors, 1);
    assert!(summary.has_errors());
    assert_eq!(summary.files, 2);

    let folder = fx
        .catalog
        .get_folder_by_path(&storage_path(&locked_dir))
        .unwrap()
        .unwrap();
    assert!(folder.error_status.is_some());
    assert!(!folder.removed);

    let sets = DuplicateDetector::new(Arc::clone(&fx.catalog))
        .group_duplicates(&DuplicateQuery::default())
        .unwrap();
    assert_eq!(sets.len(), 1);
}

#[test]
fn test_unreadable_folder_contents_not_flagged_removed() {
    if is_root_user() {
        eprintln!("Skipping: permissions are not enforced for this user");
        return;
    }
    let fx = Fixture::new();
    fx.write("locked/inner/x.txt", b"x");
    fx.register();
    fx.scan(ScanMode::All);

    let locked = fx.path("locked");
    set_mode(&locked, 0o000);
    let result = fx.scanner(ScanMode::All).scan(false);
    set_mode(&locked, 0o755);
    let summary = result.unwrap();

    assert_eq!(summary.removed, 0);
    assert!(!fx.file("locked/inner/x.txt").unwrap().removed);

    // Readable again: the error is cleared.
    let summary = fx.scan(ScanMode::All);
    assert!(!summary.has_errors());
    let folder = fx
        .catalog
        .get_folder_by_path(&storage_path(&locked))
        .unwrap()
        .unwrap();
    assert!(folder.error_status.is_none());
}

#[test]
fn test_unreadable_file_recorded_and_scan_continues() {
    if is_root_user() {
        eprintln!("Skipping: permissions are not enforced for this user");
        return;
    }
    let fx = Fixture::new();
    fx.write("good.txt", b"fine");
    let bad = fx.write("bad.txt", b"unreadable");
    fx.register();
    set_mode(&bad, 0o000);

    let result = fx.scanner(ScanMode::All).scan(false);
    set_mode(&bad, 0o644);
    let summary = result.unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.files_hashed, 1);
    assert_eq!(summary.hash_failures, 1);
    assert_eq!(summary.file_errors, 1);

    let record = fx.file("bad.txt").unwrap();
    assert!(record.fingerprint.is_none());
    assert!(record.error_status.is_some());

    // The next scan retries the file.
    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.files_hashed, 1);
    let record = fx.file("bad.txt").unwrap();
    assert!(record.fingerprint.is_some());
    assert!(record.error_status.is_none());
}

#[cfg(unix)]
#[test]
fn test_symlinks_skipped_unless_traversed() {
    let fx = Fixture::new();
    fx.write("real/data.bin", b"payload");
    std::os::unix::fs::symlink(fx.path("real"), fx.path("link")).unwrap();
    std::os::unix::fs::symlink(fx.path("real/data.bin"), fx.path("alias.bin")).unwrap();
    fx.register();

    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.folders, 2);
    assert!(fx.file("alias.bin").is_none());

    fx.catalog.register_root(&fx.root, true).unwrap();
    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.folders, 3);
    assert!(fx.file("link/data.bin").is_some());
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_does_not_hang() {
    let fx = Fixture::new();
    fx.write("a/file.txt", b"x");
    std::os::unix::fs::symlink(fx.path("a"), fx.path("a/back")).unwrap();
    fx.catalog.register_root(&fx.root, true).unwrap();

    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.files, 1);
}

/// Create `name` under `dir` from raw bytes; `false` if the filesystem
/// rejects names that are not valid UTF-8.
#[cfg(unix)]
fn write_raw(dir: &std::path::Path, name: &[u8], content: &[u8]) -> bool {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::fs::write(dir.join(OsStr::from_bytes(name)), content).is_ok()
}

#[cfg(unix)]
#[test]
fn test_non_utf8_names_are_cataloged_separately() {
    let fx = Fixture::new();
    if !write_raw(&fx.root, b"a\xff", b"first") || !write_raw(&fx.root, b"a\xfe", b"second") {
        eprintln!("Skipping: filesystem rejects non-UTF-8 names");
        return;
    }
    let root = fx.register();

    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.files, 2);
    assert_eq!(summary.files_hashed, 2);
    assert!(!summary.has_errors());

    let files = fx.catalog.list_files(root.id, false).unwrap();
    assert_eq!(files.len(), 2);
    assert_ne!(files[0].path, files[1].path);
    assert_ne!(files[0].fingerprint, files[1].fingerprint);
    assert!(files.iter().all(|f| f.fingerprint.is_some()));

    // Unchanged rescan keeps both rows.
    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.removed, 0);
    assert_eq!(fx.catalog.list_files(root.id, true).unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_files_mode_finds_non_utf8_folder() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let folder = fx.root.join(OsStr::from_bytes(b"dir\xff"));
    if std::fs::create_dir(&folder).is_err() {
        eprintln!("Skipping: filesystem rejects non-UTF-8 names");
        return;
    }
    std::fs::write(folder.join("inner.txt"), b"inside").unwrap();
    let root = fx.register();
    fx.scan(ScanMode::Folders);

    let summary = fx.scan(ScanMode::Files);
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.files_hashed, 1);
    assert!(fx
        .catalog
        .list_folders(root.id, true)
        .unwrap()
        .iter()
        .all(|f| !f.removed && f.error_status.is_none()));
}
