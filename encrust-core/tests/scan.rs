mod support;

use std::{path::PathBuf, sync::Arc, time::Duration};

use encrust_core::{
    BinaryScanner, EncrustError, ScanState, TaskScheduler, Validator,
};
use support::{
    fixtures::{self, THIN_ARM64, TEXT, UNIVERSAL},
    runner::FakeRunner,
};

#[tokio::test]
async fn only_single_architecture_bundles_are_reported() {
    let root = tempfile::tempdir().unwrap();
    fixtures::write(root.path(), "lib/_fat.so", UNIVERSAL);
    let thin = fixtures::write(root.path(), "lib/_thin.so", THIN_ARM64);
    fixtures::write(root.path(), "lib/site.py", TEXT);

    let scanner = BinaryScanner::new(Arc::new(FakeRunner::new()));
    let state = ScanState::new();
    let found = scanner
        .collect(vec![root.path().to_path_buf()], Arc::clone(&state))
        .await
        .unwrap();

    assert_eq!(found, vec![thin]);
    assert_eq!(state.examined(), 3);
}

#[tokio::test]
async fn prebuilt_launcher_stubs_are_exempt() {
    let root = tempfile::tempdir().unwrap();
    fixtures::write(root.path(), "py2app/prebuilt/main-arm64", THIN_ARM64);
    fixtures::write(root.path(), "py2app/prebuilt/main-x86_64", THIN_ARM64);
    let elsewhere = fixtures::write(root.path(), "bin/main-arm64", THIN_ARM64);
    let runner = Arc::new(FakeRunner::new());

    let found = BinaryScanner::new(runner.clone())
        .collect(vec![root.path().to_path_buf()], ScanState::new())
        .await
        .unwrap();

    assert_eq!(found, vec![elsewhere]);
    assert_eq!(runner.calls_to("file").len(), 1);
}

#[tokio::test]
async fn scanning_twice_yields_the_same_set() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..20 {
        let contents = if i % 3 == 0 { THIN_ARM64 } else { UNIVERSAL };
        fixtures::write(root.path(), &format!("pkg{i}/mod.so"), contents);
    }
    let scanner = BinaryScanner::new(Arc::new(FakeRunner::new()));
    let roots = vec![root.path().to_path_buf()];

    let first = scanner
        .collect(roots.clone(), ScanState::new())
        .await
        .unwrap();
    let second = scanner.collect(roots, ScanState::new()).await.unwrap();

    assert_eq!(first.len(), 7);
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn probes_respect_the_scheduler_limit() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..12 {
        fixtures::write(root.path(), &format!("f{i}"), TEXT);
    }
    let runner = Arc::new(FakeRunner::new().with_delay(Duration::from_millis(20)));

    BinaryScanner::new(runner.clone())
        .with_scheduler(TaskScheduler::new(3))
        .collect(vec![root.path().to_path_buf()], ScanState::new())
        .await
        .unwrap();

    assert_eq!(runner.calls_to("file").len(), 12);
    assert!(runner.peak_in_flight() <= 3);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_are_not_probed() {
    let root = tempfile::tempdir().unwrap();
    let real = fixtures::write(root.path(), "Versions/A/lib.dylib", THIN_ARM64);
    std::os::unix::fs::symlink(&real, root.path().join("lib.dylib")).unwrap();

    let found = BinaryScanner::new(Arc::new(FakeRunner::new()))
        .collect(vec![root.path().to_path_buf()], ScanState::new())
        .await
        .unwrap();

    assert_eq!(found, vec![real]);
}

#[tokio::test]
async fn missing_root_is_an_io_error() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("nope");

    let err = BinaryScanner::new(Arc::new(FakeRunner::new()))
        .collect(vec![missing], ScanState::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EncrustError::Io { .. }));
}

#[tokio::test]
async fn validator_lists_every_offender() {
    let root = tempfile::tempdir().unwrap();
    let a = fixtures::write(root.path(), "a.so", THIN_ARM64);
    let b = fixtures::write(root.path(), "nested/b.so", THIN_ARM64);
    fixtures::write(root.path(), "c.so", UNIVERSAL);

    let err = Validator::new(Arc::new(FakeRunner::new()))
        .validate(vec![root.path().to_path_buf()])
        .await
        .unwrap_err();

    match err {
        EncrustError::ArchitectureStillInconsistent { paths } => {
            assert_eq!(paths, vec![a, b]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn validator_accepts_clean_tree() {
    let root = tempfile::tempdir().unwrap();
    fixtures::write(root.path(), "a.so", UNIVERSAL);
    fixtures::write(root.path(), "prebuilt/main-x86_64", THIN_ARM64);

    Validator::new(Arc::new(FakeRunner::new()))
        .validate(vec![PathBuf::from(root.path())])
        .await
        .unwrap();
}
