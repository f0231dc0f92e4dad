use super::fixtures::{options, populate, Fixture};
use dupescan::catalog::Catalog;
use dupescan::checkpoint::{ScanMode, ScanStatus};
use dupescan::progress::ProgressCallback;
use dupescan::scanner::{OrchestratorError, Scanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Requests shutdown once `after` folders have been registered.
struct CancelAfter {
    after: usize,
    flag: Arc<AtomicBool>,
}

impl ProgressCallback for CancelAfter {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _phase: &str) {}

    fn on_folder_scanned(&self, count: usize, _path: &str) {
        if count >= self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

fn interrupted_scan(fx: &Fixture, mode: ScanMode, after: usize) -> OrchestratorError {
    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAfter {
        after,
        flag: Arc::clone(&flag),
    });
    let mut scanner = Scanner::new(Arc::clone(&fx.catalog), &fx.root, options(mode))
        .unwrap()
        .with_shutdown_flag(flag)
        .with_progress_callback(callback);
    let err = scanner.scan(false).unwrap_err();
    assert!(scanner.summary().unwrap().interrupted);
    err
}

#[test]
fn test_cancel_leaves_interrupted_checkpoint() {
    let fx = Fixture::new();
    populate(&fx, 6, 3);
    let root = fx.register();

    let err = interrupted_scan(&fx, ScanMode::All, 2);
    assert!(matches!(err, OrchestratorError::Interrupted));

    let state = fx
        .catalog
        .active_scan_state(root.id, ScanMode::All)
        .unwrap()
        .unwrap();
    assert_eq!(state.status, ScanStatus::Interrupted);
    assert_eq!(state.folders_processed, 2);
    assert!(state.completed_at.is_none());
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let interrupted = Fixture::new();
    populate(&interrupted, 8, 4);
    interrupted.register();

    interrupted_scan(&interrupted, ScanMode::All, 3);
    let summary = interrupted.scan(ScanMode::All);
    assert!(summary.resumed);
    assert!(!summary.interrupted);

    let reference = Fixture::new();
    populate(&reference, 8, 4);
    reference.register();
    reference.scan(ScanMode::All);

    assert_eq!(interrupted.snapshot(), reference.snapshot());
    assert!(interrupted
        .snapshot()
        .iter()
        .all(|f| f.fingerprint.is_some() && f.error.is_none() && !f.removed));
}

#[test]
fn test_resume_does_not_rehash_finished_files() {
    let fx = Fixture::new();
    populate(&fx, 6, 2);
    fx.register();

    interrupted_scan(&fx, ScanMode::All, 3);
    let hashed_before = fx
        .snapshot()
        .iter()
        .filter(|f| f.fingerprint.is_some())
        .count() as u64;

    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.files, 12);
    assert_eq!(summary.files_hashed, 12 - hashed_before);
}

#[test]
fn test_resume_survives_catalog_reopen() {
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("catalog.db");

    let root_path = {
        let fx = Fixture::with_catalog(Catalog::open(&db_path).unwrap());
        populate(&fx, 5, 2);
        fx.register();
        interrupted_scan(&fx, ScanMode::All, 2);
        // Keep the tree; only the catalog handle goes away.
        let Fixture { dir, root, .. } = fx;
        (dir, root)
    };

    let catalog = Arc::new(Catalog::open(&db_path).unwrap());
    let mut scanner = Scanner::new(Arc::clone(&catalog), &root_path.1, options(ScanMode::All)).unwrap();
    let summary = scanner.scan(false).unwrap();

    assert!(summary.resumed);
    assert_eq!(summary.files, 10);
    let files = catalog.list_files(scanner.root().id, false).unwrap();
    assert_eq!(files.len(), 10);
    assert!(files.iter().all(|f| f.fingerprint.is_some()));
}

#[test]
fn test_restart_discards_checkpoint() {
    let fx = Fixture::new();
    populate(&fx, 4, 1);
    let root = fx.register();
    interrupted_scan(&fx, ScanMode::All, 1);

    let summary = fx.scanner(ScanMode::All).scan(true).unwrap();

    assert!(!summary.resumed);
    let states = fx.catalog.list_scan_states(root.id).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].status, ScanStatus::Completed);
}

#[test]
fn test_stale_running_checkpoint_is_resumed() {
    let fx = Fixture::new();
    populate(&fx, 2, 1);
    let root = fx.register();
    // A process killed without flushing leaves its row running.
    let stale = fx.catalog.insert_scan_state(root.id, ScanMode::All).unwrap();

    let summary = fx.scan(ScanMode::All);

    assert!(summary.resumed);
    let state = fx.catalog.get_scan_state(stale.id).unwrap().unwrap();
    assert_eq!(state.status, ScanStatus::Completed);
}

#[test]
fn test_checkpoints_are_per_mode() {
    let fx = Fixture::new();
    populate(&fx, 3, 1);
    let root = fx.register();
    interrupted_scan(&fx, ScanMode::Folders, 1);

    let summary = fx.scan(ScanMode::All);
    assert!(!summary.resumed);

    let folders_state = fx
        .catalog
        .active_scan_state(root.id, ScanMode::Folders)
        .unwrap()
        .unwrap();
    assert_eq!(folders_state.status, ScanStatus::Interrupted);
}

#[test]
fn test_cancel_before_start() {
    let fx = Fixture::new();
    populate(&fx, 2, 2);
    fx.register();

    let flag = Arc::new(AtomicBool::new(true));
    let mut scanner = fx.scanner(ScanMode::All).with_shutdown_flag(flag);
    assert!(matches!(scanner.scan(false), Err(OrchestratorError::Interrupted)));
    assert!(fx.snapshot().is_empty());
}
