use dupescan::catalog::Catalog;
use dupescan::checkpoint::{CheckpointError, CheckpointManager, ScanMode, ScanStatus};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Arc<Catalog> {
    Arc::new(Catalog::open(&dir.path().join("catalog.db")).unwrap())
}

#[test]
fn test_checkpoint_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let root_id = {
        let catalog = open(&dir);
        let root = catalog.register_root(Path::new("/data"), false).unwrap();
        let mut manager = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::All);
        manager.start().unwrap();
        manager.save("/data/a", 1, 10).unwrap();
        manager.save("/data/b", 2, 25).unwrap();
        assert!(manager.interrupt().unwrap());
        root.id
    };

    let catalog = open(&dir);
    let mut manager = CheckpointManager::new(Arc::clone(&catalog), root_id, ScanMode::All);
    let state = manager.resume().unwrap().unwrap().clone();
    assert_eq!(state.status, ScanStatus::Running);
    assert_eq!(state.current_folder.as_deref(), Some("/data/b"));
    assert_eq!(state.folders_processed, 2);
    assert_eq!(state.files_processed, 25);

    let done = manager.complete().unwrap();
    assert_eq!(done.status, ScanStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(manager.resume().unwrap().is_none());
}

#[test]
fn test_only_one_active_checkpoint_per_root_and_mode() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir);
    let root = catalog.register_root(Path::new("/data"), false).unwrap();

    let mut first = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::All);
    first.start().unwrap();

    let mut second = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::All);
    assert!(matches!(
        second.start(),
        Err(CheckpointError::AlreadyActive { .. })
    ));

    // Interrupted still counts as active.
    first.interrupt().unwrap();
    assert!(matches!(
        second.start(),
        Err(CheckpointError::AlreadyActive { .. })
    ));

    // A different mode is independent.
    let mut files = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::Files);
    files.start().unwrap();

    assert_eq!(catalog.list_scan_states(root.id).unwrap().len(), 2);
}

#[test]
fn test_completed_checkpoint_is_final() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir);
    let root = catalog.register_root(Path::new("/data"), false).unwrap();
    let mut manager = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::Folders);
    let id = manager.start().unwrap().id;
    manager.complete().unwrap();

    assert!(!catalog
        .transition_scan_state(id, ScanStatus::Running, ScanStatus::Interrupted)
        .unwrap());
    assert!(matches!(
        manager.save("/data/x", 1, 1),
        Err(CheckpointError::NotStarted)
    ));

    // A new scan starts a fresh row; history is kept.
    manager.start().unwrap();
    assert_eq!(catalog.list_scan_states(root.id).unwrap().len(), 2);
}

#[test]
fn test_clear_removes_checkpoints_but_keeps_catalog() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir);
    let root = catalog.register_root(Path::new("/data"), false).unwrap();
    let folder = catalog.upsert_folder(root.id, "/data", None, None).unwrap();

    let mut manager = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::All);
    manager.start().unwrap();
    manager.interrupt().unwrap();

    assert_eq!(manager.clear().unwrap(), 1);
    assert!(manager.current().is_none());
    assert!(catalog.list_scan_states(root.id).unwrap().is_empty());
    assert_eq!(catalog.list_folders(root.id, false).unwrap()[0].id, folder);
}

#[test]
fn test_deregister_removes_checkpoints() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir);
    let root = catalog.register_root(Path::new("/data"), false).unwrap();
    let mut manager = CheckpointManager::new(Arc::clone(&catalog), root.id, ScanMode::All);
    let id = manager.start().unwrap().id;

    catalog.deregister_root(Path::new("/data")).unwrap();
    assert!(catalog.get_scan_state(id).unwrap().is_none());
}
