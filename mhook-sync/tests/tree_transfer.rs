//! Tree transfer behaviour against in-memory and directory-backed stores.

use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use filetime::FileTime;
use mhook_core::{keys::resolve_object, ArtifactCoordinate};
use mhook_sync::{
    store::{DirStore, Fault, MemoryStore},
    tree::{download_tree, upload_tree},
    Mhook, NoProgress, SyncError, TransferOutcome, TreeOptions,
};
use tempfile::TempDir;

fn coord() -> ArtifactCoordinate {
    ArtifactCoordinate::new("app", "main", "abc123")
}

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn three_objects(store: &MemoryStore) {
    store.insert("app/main/abc123/1-first", "one");
    store.insert("app/main/abc123/2-second", "two");
    store.insert("app/main/abc123/3-third", "three");
}

#[test]
fn upload_then_download_is_byte_identical() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "bin/server", "server-binary");
    write(src.path(), "lib/nested/libfoo.so", "\u{0}\u{1}\u{2}elf");
    write(src.path(), "README", "docs");

    let mhook = Mhook::new(MemoryStore::new());
    let up = mhook.upload(&coord(), src.path()).expect("upload");
    assert_eq!(up.uploaded(), 3);

    let down = mhook.download(&coord(), dst.path()).expect("download");
    assert_eq!(down.downloaded(), 3);
    for relative in ["bin/server", "lib/nested/libfoo.so", "README"] {
        assert_eq!(
            fs::read(src.path().join(relative)).unwrap(),
            fs::read(dst.path().join(relative)).unwrap(),
            "{relative} differs"
        );
    }
}

#[test]
fn second_download_transfers_zero_bytes_and_keeps_file() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    store.insert("app/main/abc123/bin/server", "payload");
    let mhook = Mhook::new(store);
    let target = coord().with_target("bin/server");
    let dest = dst.path().join("server");

    let first = mhook.download(&target, &dest).expect("first");
    assert_eq!(first.downloaded(), 1);
    assert_eq!(mhook.store().stats().bytes_served, 7);
    let mtime_1 = FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());

    sleep(Duration::from_millis(1100));
    mhook.store().reset_stats();
    let second = mhook.download(&target, &dest).expect("second");

    assert_eq!(second.unchanged(), 1);
    assert_eq!(second.bytes(), 0);
    assert_eq!(mhook.store().stats().bytes_served, 0);
    let mtime_2 = FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
    assert_eq!(mtime_1, mtime_2, "file was rewritten");
    assert_eq!(fs::read(&dest).unwrap(), b"payload");
}

#[test]
fn sequential_failure_keeps_first_and_skips_third() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    three_objects(&store);
    store.inject("app/main/abc123/2-second", Fault::GetInterrupted { after_bytes: 1 });

    let err = download_tree(
        &store,
        &resolve_object(&coord()).unwrap(),
        dst.path(),
        TreeOptions::default(),
        &NoProgress,
    )
    .unwrap_err();

    match &err {
        SyncError::PartialTreeFailure {
            key,
            completed,
            source,
        } => {
            assert_eq!(key, "app/main/abc123/2-second");
            assert_eq!(completed.len(), 1);
            assert_eq!(completed[0].key(), "app/main/abc123/1-first");
            assert!(matches!(**source, SyncError::TransferFailed { .. }));
        }
        other => panic!("expected partial tree failure, got {other:?}"),
    }
    assert!(err.to_string().contains("2-second"));
    assert_eq!(fs::read(dst.path().join("1-first")).unwrap(), b"one");
    assert!(!dst.path().join("2-second").exists());
    assert!(!dst.path().join("3-third").exists());
}

#[test]
fn failure_before_anything_completes_is_returned_as_is() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    three_objects(&store);
    store.inject("app/main/abc123/1-first", Fault::GetInterrupted { after_bytes: 1 });

    let err = download_tree(
        &store,
        &resolve_object(&coord()).unwrap(),
        dst.path(),
        TreeOptions::default(),
        &NoProgress,
    )
    .unwrap_err();

    assert!(matches!(err, SyncError::TransferFailed { .. }), "got: {err}");
    assert!(!dst.path().join("1-first").exists());
    assert!(!dst.path().join("2-second").exists());
}

#[test]
#[cfg(unix)]
fn download_into_read_only_directory_is_not_writable() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let ro = tmp.path().join("ro");
    fs::create_dir(&ro).unwrap();
    fs::set_permissions(&ro, fs::Permissions::from_mode(0o555)).unwrap();

    let store = MemoryStore::new();
    store.insert("app/main/abc123/bin/server", "server-binary");
    let mhook = Mhook::new(store);
    let result = mhook.download(&coord().with_target("bin/server"), &ro.join("server"));
    fs::set_permissions(&ro, fs::Permissions::from_mode(0o755)).unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::DestinationNotWritable { .. }), "got: {err}");
    assert_eq!(err.failed_key(), None);
    assert_eq!(mhook.store().stats().gets, 0);
}

#[test]
fn parallel_failure_still_reports_failed_key() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    three_objects(&store);
    store.inject("app/main/abc123/2-second", Fault::GetInterrupted { after_bytes: 0 });

    let err = download_tree(
        &store,
        &resolve_object(&coord()).unwrap(),
        dst.path(),
        TreeOptions { concurrency: 3 },
        &NoProgress,
    )
    .unwrap_err();

    assert_eq!(err.failed_key(), Some("app/main/abc123/2-second"));
    assert!(!dst.path().join("2-second").exists());
    if let SyncError::PartialTreeFailure { completed, .. } = &err {
        for outcome in completed {
            assert!(outcome.path().exists(), "{} missing", outcome.path().display());
        }
    }
}

#[test]
fn parallel_download_of_many_objects_succeeds() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    for i in 0..25 {
        store.insert(&format!("app/main/abc123/dir{}/file{i}", i % 4), format!("body {i}"));
    }
    let report = download_tree(
        &store,
        &resolve_object(&coord()).unwrap(),
        dst.path(),
        TreeOptions { concurrency: 4 },
        &NoProgress,
    )
    .expect("download");

    assert_eq!(report.downloaded(), 25);
    assert_eq!(
        fs::read_to_string(dst.path().join("dir3").join("file7")).unwrap(),
        "body 7"
    );
}

#[test]
fn every_page_of_a_paginated_listing_is_consumed() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new().with_page_size(2);
    for i in 0..7 {
        store.insert(&format!("app/main/abc123/f{i}"), "x");
    }
    let report = download_tree(
        &store,
        &resolve_object(&coord()).unwrap(),
        dst.path(),
        TreeOptions::default(),
        &NoProgress,
    )
    .expect("download");
    assert_eq!(report.downloaded(), 7);
    assert!(dst.path().join("f6").exists());
}

#[test]
fn other_commits_are_not_downloaded() {
    let dst = TempDir::new().unwrap();
    let store = MemoryStore::new();
    store.insert("app/main/abc123/a", "mine");
    store.insert("app/main/abc1234/a", "not mine");
    store.insert("app/main/latest/a", "alias");

    let report = Mhook::new(store).download(&coord(), dst.path()).expect("download");
    assert_eq!(report.downloaded(), 1);
    assert_eq!(fs::read(dst.path().join("a")).unwrap(), b"mine");
}

#[test]
fn upload_failure_reports_partial_tree() {
    let src = TempDir::new().unwrap();
    write(src.path(), "a", "1");
    write(src.path(), "b", "2");
    write(src.path(), "c", "3");
    let store = MemoryStore::new();
    store.inject("app/main/abc123/b", Fault::PutRejected);

    let err = upload_tree(
        &store,
        src.path(),
        &resolve_object(&coord()).unwrap(),
        TreeOptions::default(),
        &NoProgress,
    )
    .unwrap_err();

    assert_eq!(err.failed_key(), Some("app/main/abc123/b"));
    assert_eq!(store.keys(), ["app/main/abc123/a"]);
}

#[test]
#[cfg(unix)]
fn unreadable_subdirectory_aborts_upload_before_any_transfer() {
    use std::os::unix::fs::PermissionsExt;

    let src = TempDir::new().unwrap();
    write(src.path(), "a", "1");
    write(src.path(), "locked/secret", "2");
    let locked = src.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    // Root can read a 0o000 directory; the walk then has nothing to fail on.
    let walk_can_fail = fs::read_dir(&locked).is_err();

    let store = MemoryStore::new();
    let result = upload_tree(
        &store,
        src.path(),
        &resolve_object(&coord()).unwrap(),
        TreeOptions::default(),
        &NoProgress,
    );
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    if walk_can_fail {
        let err = result.unwrap_err();
        assert!(matches!(err, SyncError::Walk { .. }), "got: {err}");
        assert!(store.keys().is_empty());
    }
}

#[test]
fn directory_store_round_trip_and_not_modified() {
    let bucket = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write(src.path(), "bin/server", "v1");

    let mhook = Mhook::new(DirStore::new(bucket.path()));
    mhook.upload(&coord(), src.path()).expect("upload");
    assert!(bucket.path().join("app/main/abc123/bin/server").is_file());

    let first = mhook.download(&coord(), dst.path()).expect("download");
    assert_eq!(first.downloaded(), 1);
    let second = mhook.download(&coord(), dst.path()).expect("download again");
    assert_eq!(second.unchanged(), 1);
    assert!(matches!(
        second.outcomes[0],
        TransferOutcome::Unchanged { .. }
    ));
}
