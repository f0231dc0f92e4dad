use super::fixtures::Fixture;
use dupescan::catalog::Catalog;
use dupescan::checkpoint::ScanMode;
use dupescan::duplicates::{DetectorError, DuplicateDetector, DuplicateQuery, SortOrder};
use dupescan::pool::PoolConfig;
use dupescan::scanner::path_utils::{absolute_root, storage_path};
use dupescan::scanner::{HashAlgorithm, ScanOptions, Scanner};
use std::sync::Arc;
use tempfile::TempDir;

fn detector(fx: &Fixture) -> DuplicateDetector {
    DuplicateDetector::new(Arc::clone(&fx.catalog))
}

#[test]
fn test_no_duplicates_among_unique_files() {
    let fx = Fixture::new();
    fx.write("a.txt", b"content a");
    fx.write("b.txt", b"content b");
    fx.write("c.txt", b"content c");
    fx.register();
    fx.scan(ScanMode::All);

    let report = detector(&fx).find_duplicates(&DuplicateQuery::default()).unwrap();
    assert!(report.sets.is_empty());
    assert_eq!(report.stats.total_sets, 0);
}

#[test]
fn test_pair_found_across_folders() {
    let fx = Fixture::new();
    fx.write("A", b"0123456789");
    fx.write("sub/B", b"0123456789");
    fx.write("C", b"abcdefghij");
    fx.write("D", b"01234567890123456789");
    fx.register();
    fx.scan(ScanMode::All);

    let sets = detector(&fx).group_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].size, 10);
    let paths: Vec<_> = sets[0].members.iter().map(|m| m.path.clone()).collect();
    assert_eq!(
        paths,
        vec![storage_path(&fx.path("A")), storage_path(&fx.path("sub/B"))]
    );

    let triples = DuplicateQuery::default().with_min_count(3);
    assert!(detector(&fx).group_duplicates(&triples).unwrap().is_empty());
}

#[test]
fn test_min_size_filter() {
    let fx = Fixture::new();
    for name in ["x", "y", "z"] {
        fx.write(name, b"12345");
    }
    fx.register();
    fx.scan(ScanMode::All);

    let all = detector(&fx).group_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].len(), 3);

    let big = DuplicateQuery::default().with_min_size(1000);
    assert!(detector(&fx).group_duplicates(&big).unwrap().is_empty());
}

#[test]
fn test_zero_byte_files_are_not_duplicates() {
    let fx = Fixture::new();
    fx.write("empty1", b"");
    fx.write("empty2", b"");
    fx.register();
    let summary = fx.scan(ScanMode::All);

    assert_eq!(summary.files_hashed, 2);
    assert!(fx.file("empty1").unwrap().fingerprint.is_some());
    assert!(detector(&fx)
        .group_duplicates(&DuplicateQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_removed_files_excluded() {
    let fx = Fixture::new();
    fx.write("a", b"same");
    let b = fx.write("b", b"same");
    fx.register();
    fx.scan(ScanMode::All);
    assert_eq!(detector(&fx).group_duplicates(&DuplicateQuery::default()).unwrap().len(), 1);

    std::fs::remove_file(b).unwrap();
    fx.scan(ScanMode::All);
    assert!(detector(&fx)
        .group_duplicates(&DuplicateQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_stats_and_ordering() {
    let fx = Fixture::new();
    for name in ["big1", "big2"] {
        fx.write(name, &[7u8; 100]);
    }
    for name in ["small1", "small2", "small3"] {
        fx.write(name, &[1u8; 10]);
    }
    fx.register();
    fx.scan(ScanMode::All);

    let report = detector(&fx).find_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(report.sets.len(), 2);
    assert_eq!(report.sets[0].size, 100);
    assert_eq!(report.stats.total_files, 5);
    assert_eq!(report.stats.total_bytes, 230);
    assert_eq!(report.stats.recoverable_bytes, 120);

    let by_count = detector(&fx)
        .group_duplicates(&DuplicateQuery::default().with_sort(SortOrder::Count))
        .unwrap();
    assert_eq!(by_count[0].size, 10);

    let by_path = detector(&fx)
        .group_duplicates(&DuplicateQuery::default().with_sort(SortOrder::Path))
        .unwrap();
    assert!(by_path[0].first_path().ends_with("big1"));
}

#[test]
fn test_duplicates_across_roots_and_root_filter() {
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    std::fs::write(first.path().join("a"), b"shared").unwrap();
    std::fs::write(second.path().join("b"), b"shared").unwrap();
    std::fs::write(second.path().join("c"), b"shared").unwrap();

    for dir in [&first, &second] {
        let root = absolute_root(dir.path()).unwrap();
        catalog.register_root(&root, false).unwrap();
        let options = ScanOptions {
            mode: ScanMode::All,
            algorithm: HashAlgorithm::Blake3,
            pool: PoolConfig::with_workers(1),
        };
        Scanner::new(Arc::clone(&catalog), &root, options)
            .unwrap()
            .scan(false)
            .unwrap();
    }

    let detector = DuplicateDetector::new(Arc::clone(&catalog));
    let all = detector.group_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].len(), 3);
    assert_eq!(all[0].algorithm, "blake3");

    let only_first = DuplicateQuery::default().with_root(first.path());
    assert!(detector.group_duplicates(&only_first).unwrap().is_empty());

    let only_second = DuplicateQuery::default().with_root(second.path());
    let sets = detector.group_duplicates(&only_second).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 2);

    let unknown = TempDir::new().unwrap();
    assert!(matches!(
        detector.group_duplicates(&DuplicateQuery::default().with_root(unknown.path())),
        Err(DetectorError::UnknownRoot(_))
    ));
}

#[test]
fn test_algorithms_do_not_mix() {
    let fx = Fixture::new();
    fx.write("a", b"same bytes");
    fx.write("b", b"same bytes");
    fx.register();
    fx.scan(ScanMode::All);

    // Rehash one file with another algorithm: the pair no longer matches.
    let b = fx.file("b").unwrap();
    let blake = dupescan::scanner::Hasher::new(HashAlgorithm::Blake3)
        .hash_file(&fx.path("b"))
        .unwrap();
    fx.catalog.update_file_fingerprint(b.id, &blake).unwrap();

    assert!(detector(&fx)
        .group_duplicates(&DuplicateQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_names_differing_only_by_case_are_separate_files() {
    let fx = Fixture::new();
    fx.write("Report.txt", b"quarterly numbers");
    fx.write("report.txt", b"quarterly numbers");
    let on_disk = std::fs::read_dir(&fx.root).unwrap().count();
    if on_disk < 2 {
        eprintln!("Skipping: filesystem is case-insensitive");
        return;
    }
    fx.register();
    let summary = fx.scan(ScanMode::All);
    assert_eq!(summary.files, 2);

    let sets = detector(&fx).group_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 2);
    assert!(sets[0].members.iter().all(|m| m.aliases.is_empty()));
}

#[cfg(unix)]
#[test]
fn test_case_variant_hard_link_is_one_member() {
    let fx = Fixture::new();
    let upper = fx.write("Photo.jpg", b"pixels");
    fx.write("copy.jpg", b"pixels");
    let lower = fx.path("photo.jpg");
    if !lower.exists() {
        std::fs::hard_link(&upper, &lower).unwrap();
    }
    fx.register();
    fx.scan(ScanMode::All);

    let sets = detector(&fx).group_duplicates(&DuplicateQuery::default()).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 2);
    let photo = sets[0]
        .members
        .iter()
        .find(|m| m.path == storage_path(&upper))
        .unwrap();
    // Only a case-sensitive filesystem holds both spellings as catalog rows
    if std::fs::read_dir(&fx.root).unwrap().count() == 3 {
        assert_eq!(photo.aliases, vec![storage_path(&lower)]);
    }
}
