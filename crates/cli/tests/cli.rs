//! Process-level tests over the `sx` binary: subcommand dispatch, the
//! implicit-search shorthand, exit codes, and the JSON hit schema.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn sx() -> Command {
    Command::cargo_bin("sx").unwrap()
}

fn sample_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src/auth")).unwrap();
    fs::write(dir.path().join("src/auth/login.rs"), "fn check_token() -> bool { true }").unwrap();
    fs::write(dir.path().join("src/misc.rs"), "fn noop() {}").unwrap();
    dir
}

#[test]
fn status_before_indexing_exits_3() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("status")
        .arg("--index")
        .arg(&store)
        .assert()
        .code(3);
}

#[test]
fn index_then_search_roundtrip() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("index")
        .arg(project.path())
        .arg("--index")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("indexed 2 file(s)"));

    sx().arg("status").arg("--index").arg(&store).assert().success();

    let output = sx()
        .arg("search")
        .arg("token")
        .arg("--index")
        .arg(&store)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["path"], "src/auth/login.rs");
    assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
    assert!(hits[0]["terms"].as_array().unwrap().contains(&serde_json::json!("token")));
}

#[test]
fn implicit_search_shorthand_matches_explicit_subcommand() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("index").arg(project.path()).arg("--index").arg(&store).assert().success();

    let explicit = sx()
        .arg("search")
        .arg("token")
        .arg("--index")
        .arg(&store)
        .arg("--json")
        .output()
        .unwrap();
    let implicit = sx().arg("token").arg("--index").arg(&store).arg("--json").output().unwrap();

    assert!(explicit.status.success());
    assert!(implicit.status.success());
    assert_eq!(explicit.stdout, implicit.stdout);
}

#[test]
fn path_shorthand_filters_like_explicit_path_flag() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("index").arg(project.path()).arg("--index").arg(&store).assert().success();

    // `sx "query" path/` is shorthand for `sx search "query" --path path/`.
    let shorthand =
        sx().arg("token").arg("auth").arg("--index").arg(&store).arg("--json").output().unwrap();
    let explicit = sx()
        .arg("search")
        .arg("token")
        .arg("--path")
        .arg("auth")
        .arg("--index")
        .arg(&store)
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(shorthand.stdout, explicit.stdout);
    let hits: serde_json::Value = serde_json::from_slice(&shorthand.stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
}

#[test]
fn search_against_empty_store_exits_zero_with_no_results() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("search")
        .arg("nonexistent")
        .arg("--index")
        .arg(&store)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("no results"));
}

#[test]
fn status_json_reports_document_count_after_indexing() {
    let project = sample_project();
    let store = project.path().join("sx.db");

    sx().arg("index").arg(project.path()).arg("--index").arg(&store).assert().success();

    let output = sx().arg("status").arg("--index").arg(&store).arg("--json").output().unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["indexed"], true);
    assert_eq!(status["n_docs"], 2);
}
