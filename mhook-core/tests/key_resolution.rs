//! Key resolution against the MUFL layout.
//!
//! Each `#[case]` is isolated; no shared state.

use mhook_core::{
    keys::{resolve_head, resolve_object},
    ArtifactCoordinate, CoordinateError,
};
use rstest::rstest;

fn app_main(commit: &str, target: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new("app", "main", commit).with_target(target)
}

#[test]
fn object_key_for_commit_target() {
    let key = resolve_object(&app_main("abc123", "bin/server")).expect("resolve");
    assert_eq!(key.as_str(), "/app/main/abc123/bin/server");
}

#[test]
fn head_key_ignores_commit_and_target() {
    let a = resolve_head(&app_main("abc123", "bin/server")).expect("resolve");
    let b = resolve_head(&app_main("latest", "")).expect("resolve");
    assert_eq!(a.as_str(), "/app/main/HEAD");
    assert_eq!(a, b);
}

#[test]
fn latest_alias_resolves_under_latest() {
    let key = resolve_object(&app_main("abc123", "bin/server").to_latest()).expect("resolve");
    assert_eq!(key.as_str(), "/app/main/latest/bin/server");
}

#[test]
fn resolution_is_deterministic() {
    let coord = app_main("abc123", "lib/libfoo.so");
    let first = resolve_object(&coord).expect("resolve");
    for _ in 0..3 {
        assert_eq!(resolve_object(&coord).expect("resolve"), first);
    }
}

#[rstest]
#[case::project(ArtifactCoordinate::new("other", "main", "abc123").with_target("bin/server"))]
#[case::branch(ArtifactCoordinate::new("app", "dev", "abc123").with_target("bin/server"))]
#[case::commit(app_main("def456", "bin/server"))]
#[case::target(app_main("abc123", "bin/client"))]
#[case::case_sensitive(app_main("ABC123", "bin/server"))]
fn differing_field_yields_different_key(#[case] other: ArtifactCoordinate) {
    let base = resolve_object(&app_main("abc123", "bin/server")).expect("resolve");
    let key = resolve_object(&other).expect("resolve");
    assert_ne!(base, key);
}

#[rstest]
#[case::empty_project(ArtifactCoordinate::new("", "main", "abc123"), "project")]
#[case::empty_branch(ArtifactCoordinate::new("app", "", "abc123"), "branch")]
#[case::empty_commit(ArtifactCoordinate::new("app", "main", ""), "commit")]
fn empty_component_is_rejected(#[case] coord: ArtifactCoordinate, #[case] field: &str) {
    let err = resolve_object(&coord).expect_err("must reject");
    assert!(matches!(err, CoordinateError::Empty { .. }), "got: {err}");
    assert!(err.to_string().contains(field));
}

#[test]
fn head_rejects_empty_project() {
    let err = resolve_head(&ArtifactCoordinate::new("", "main", "latest")).expect_err("reject");
    assert_eq!(err, CoordinateError::Empty { field: "project" });
}

#[rstest]
#[case("a/b", "main")]
#[case("app", "feature/x")]
fn separator_in_segment_is_rejected(#[case] project: &str, #[case] branch: &str) {
    let err = resolve_object(&ArtifactCoordinate::new(project, branch, "abc123"))
        .expect_err("must reject");
    assert!(matches!(err, CoordinateError::Separator { .. }), "got: {err}");
}

#[rstest]
#[case("../secrets")]
#[case("bin/../../x")]
#[case("./bin")]
fn relative_target_segment_is_rejected(#[case] target: &str) {
    let err = resolve_object(&app_main("abc123", target)).expect_err("must reject");
    assert!(matches!(err, CoordinateError::RelativeSegment { .. }), "got: {err}");
}
