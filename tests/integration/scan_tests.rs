use super::fixtures::{populate, Fixture};
use dupescan::checkpoint::{ScanMode, ScanStatus};
use dupescan::scanner::path_utils::storage_path;
use dupescan::scanner::{HashAlgorithm, Hasher, OrchestratorError};
use filetime::{set_file_mtime, FileTime};
use std::fs;

#[test]
fn test_scan_empty_directory() {
    let fx = Fixture::new();
    fx.register();

    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.folders, 1);
    assert_eq!(summary.files, 0);
    assert_eq!(summary.files_hashed, 0);
    assert!(!summary.has_errors());
}

#[test]
fn test_every_entry_cataloged_once() {
    let fx = Fixture::new();
    populate(&fx, 3, 4);
    fx.mkdir("empty");
    fx.register();

    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.folders, 5);
    assert_eq!(summary.files, 12);
    assert_eq!(summary.files_hashed, 12);

    let snapshot = fx.snapshot();
    assert_eq!(snapshot.len(), 12);
    assert!(snapshot.iter().all(|f| f.fingerprint.is_some() && f.error.is_none()));
    assert!(snapshot
        .iter()
        .all(|f| f.algorithm.as_deref() == Some("sha256")));

    let folders = fx.catalog.list_folders(fx.root_id(), false).unwrap();
    assert_eq!(folders.len(), 5);
}

#[test]
fn test_rescan_is_idempotent() {
    let fx = Fixture::new();
    populate(&fx, 2, 3);
    fx.register();

    fx.scan(ScanMode::All);
    let first = fx.snapshot();
    let first_ids: Vec<_> = fx
        .catalog
        .list_files(fx.root_id(), true)
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();

    let second_summary = fx.scan(ScanMode::All);
    let second_ids: Vec<_> = fx
        .catalog
        .list_files(fx.root_id(), true)
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();

    assert_eq!(fx.snapshot(), first);
    assert_eq!(first_ids, second_ids);
    assert_eq!(second_summary.files_hashed, 0, "unchanged files are not re-hashed");
}

#[test]
fn test_root_statistics_written_back() {
    let fx = Fixture::new();
    fx.write("a.txt", b"12345");
    fx.write("sub/b.txt", b"1234567890");
    let root = fx.register();
    assert_eq!(root.file_count, 0);
    assert!(root.last_scan_at.is_none());

    fx.scan(ScanMode::All);

    let root = fx.catalog.get_root(root.id).unwrap().unwrap();
    assert_eq!(root.folder_count, 2);
    assert_eq!(root.file_count, 2);
    assert_eq!(root.total_size, 15);
    assert!(root.last_scan_at.is_some());
}

#[test]
fn test_folders_mode_registers_folders_only() {
    let fx = Fixture::new();
    populate(&fx, 2, 2);
    fx.register();

    let summary = fx.scan(ScanMode::Folders);

    assert_eq!(summary.folders, 3);
    assert_eq!(summary.files, 0);
    assert!(fx.snapshot().is_empty());
    assert_eq!(fx.catalog.list_folders(fx.root_id(), false).unwrap().len(), 3);
}

#[test]
fn test_files_mode_hashes_cataloged_folders() {
    let fx = Fixture::new();
    populate(&fx, 2, 2);
    fx.register();
    fx.scan(ScanMode::Folders);

    let summary = fx.scan(ScanMode::Files);

    assert_eq!(summary.folders, 3);
    assert_eq!(summary.files, 4);
    assert_eq!(summary.files_hashed, 4);
    assert!(fx.snapshot().iter().all(|f| f.fingerprint.is_some()));
}

#[test]
fn test_files_mode_without_folders_fails() {
    let fx = Fixture::new();
    fx.write("a.txt", b"a");
    fx.register();

    let err = fx.scanner(ScanMode::Files).scan(false).unwrap_err();
    assert!(matches!(err, OrchestratorError::NoFolders(_)));
}

#[test]
fn test_files_mode_flags_vanished_folder() {
    let fx = Fixture::new();
    fx.write("keep/a.txt", b"a");
    fx.write("gone/b.txt", b"b");
    fx.register();
    fx.scan(ScanMode::All);

    fs::remove_dir_all(fx.path("gone")).unwrap();
    let summary = fx.scan(ScanMode::Files);

    assert_eq!(summary.removed, 1);
    let gone = fx
        .catalog
        .get_folder_by_path(&storage_path(&fx.path("gone")))
        .unwrap()
        .unwrap();
    assert!(gone.removed);
    assert!(fx.file("gone/b.txt").unwrap().removed);
    assert!(!fx.file("keep/a.txt").unwrap().removed);
}

#[test]
fn test_deleted_file_flagged_and_reappearing_file_restored() {
    let fx = Fixture::new();
    fx.write("a.txt", b"alpha");
    fx.write("b.txt", b"beta");
    fx.register();
    fx.scan(ScanMode::All);

    fs::remove_file(fx.path("b.txt")).unwrap();
    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.removed, 1);
    assert!(fx.file("b.txt").unwrap().removed);
    assert_eq!(fx.catalog.get_root(fx.root_id()).unwrap().unwrap().file_count, 1);

    fx.write("b.txt", b"beta");
    fx.scan(ScanMode::All);
    let restored = fx.file("b.txt").unwrap();
    assert!(!restored.removed);
    assert!(restored.fingerprint.is_some());
}

#[test]
fn test_deleted_folder_flagged_removed() {
    let fx = Fixture::new();
    fx.write("sub/deeper/x.txt", b"x");
    fx.write("top.txt", b"t");
    fx.register();
    fx.scan(ScanMode::All);

    fs::remove_dir_all(fx.path("sub")).unwrap();
    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.removed, 2);
    assert!(fx.file("sub/deeper/x.txt").unwrap().removed);
    assert_eq!(fx.catalog.list_folders(fx.root_id(), false).unwrap().len(), 1);
}

#[test]
fn test_modified_file_is_rehashed() {
    let fx = Fixture::new();
    let path = fx.write("a.txt", b"first");
    fx.register();
    fx.scan(ScanMode::All);
    let before = fx.file("a.txt").unwrap().fingerprint.unwrap();

    fs::write(&path, b"second version").unwrap();
    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.files_hashed, 1);
    let after = fx.file("a.txt").unwrap();
    assert_eq!(after.size, 14);
    assert_ne!(after.fingerprint.unwrap(), before);
}

#[test]
fn test_touched_file_with_same_size_is_rehashed() {
    let fx = Fixture::new();
    let path = fx.write("a.txt", b"aaaa");
    fx.register();
    fx.scan(ScanMode::All);

    fs::write(&path, b"bbbb").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.files_hashed, 1);
    let after = fx.file("a.txt").unwrap();
    assert_eq!(after.mtime, 1_000_000);
    let expected = Hasher::new(HashAlgorithm::Sha256).hash_bytes(b"bbbb");
    assert_eq!(after.fingerprint, Some(expected.value));
}

#[test]
fn test_completed_checkpoint_recorded() {
    let fx = Fixture::new();
    populate(&fx, 2, 1);
    let root = fx.register();

    fx.scan(ScanMode::All);

    let states = fx.catalog.list_scan_states(root.id).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].status, ScanStatus::Completed);
    assert_eq!(states[0].folders_processed, 3);
    assert_eq!(states[0].files_processed, 2);
    assert!(states[0].completed_at.is_some());
    assert!(fx
        .catalog
        .active_scan_state(root.id, ScanMode::All)
        .unwrap()
        .is_none());
}
