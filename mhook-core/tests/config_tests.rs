//! Config file load/save and layering.

use std::fs;

use assert_fs::prelude::*;
use mhook_core::{config, ConfigError, ConfigFile};
use predicates::prelude::*;

#[test]
fn save_then_load_roundtrip() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = ConfigFile {
        bucket: Some("artifacts".into()),
        project: Some("app".into()),
        region: Some("eu-west-1".into()),
        max_retries: Some(3),
        store: Some("/srv/buckets".into()),
        ..Default::default()
    };
    config::save_at(home.path(), &file).expect("save");

    home.child(".mhook/config.yaml")
        .assert(predicate::str::contains("bucket: artifacts"));
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded, file);
}

#[test]
fn unset_fields_are_not_serialized() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = ConfigFile {
        bucket: Some("artifacts".into()),
        ..Default::default()
    };
    config::save_at(home.path(), &file).expect("save");
    home.child(".mhook/config.yaml")
        .assert(predicate::str::contains("region").not());
}

#[test]
fn corrupt_yaml_reports_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::config_path_at(home.path());
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(&path, b"bucket: [unclosed").expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn explicit_missing_file_is_io_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_from(&home.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
}

#[test]
fn resolve_requires_bucket_and_project() {
    let err = ConfigFile::default().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("bucket")));

    let err = ConfigFile {
        bucket: Some("artifacts".into()),
        project: Some(String::new()),
        ..Default::default()
    }
    .resolve()
    .unwrap_err();
    assert!(matches!(err, ConfigError::Missing("project")));
}

#[test]
fn resolve_rejects_invalid_coordinate() {
    let err = ConfigFile {
        bucket: Some("artifacts".into()),
        project: Some("app".into()),
        branch: Some("feature/x".into()),
        store: Some("/srv".into()),
        ..Default::default()
    }
    .resolve()
    .unwrap_err();
    assert!(matches!(err, ConfigError::Coordinate(_)), "got: {err}");
}

#[test]
fn resolved_coordinate_targets_whole_tree() {
    let config = ConfigFile {
        bucket: Some("artifacts".into()),
        project: Some("app".into()),
        commit: Some("abc123".into()),
        store: Some("/srv".into()),
        ..Default::default()
    }
    .resolve()
    .expect("resolve");
    let coord = config.coordinate();
    assert_eq!(coord.commit.0, "abc123");
    assert!(coord.target.is_empty());
}
