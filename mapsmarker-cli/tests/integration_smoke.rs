//! Smoke tests to verify command module wiring

use assert_cmd::Command;
use predicates::prelude::*;

fn mapsmarker() -> Command {
    let mut cmd = Command::cargo_bin("mapsmarker").unwrap();
    // Keep the developer's environment out of the assertions
    cmd.env_remove("DATABASE_URL").env_remove("MAPSMARKER_TABLE_PREFIX");
    cmd
}

#[test]
fn test_top_level_help_lists_commands() {
    mapsmarker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("stats"));
}

// === Serve Command Tests ===

#[test]
fn test_serve_help() {
    mapsmarker()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Address to bind to"))
        .stdout(predicate::str::contains("--cors-permissive"));
}

#[test]
fn test_serve_rejects_bad_bind_address() {
    mapsmarker()
        .args(["serve", "--bind", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// === Schema Command Tests ===

#[test]
fn test_schema_help() {
    mapsmarker()
        .args(["schema", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn test_schema_print_needs_no_database() {
    mapsmarker()
        .args(["schema", "print"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wp_mmp_markers"))
        .stdout(predicate::str::contains("wp_mmp_relationships"));
}

#[test]
fn test_schema_drop_requires_confirmation() {
    mapsmarker()
        .args(["schema", "drop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

// === Import Command Tests ===

#[test]
fn test_import_help() {
    mapsmarker()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--geocode"));
}

#[test]
fn test_import_dry_run_summarizes_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("export.json");
    std::fs::write(
        &file,
        r#"{"maps": [{"name": "Office"}],
            "markers": [{"name": "Desk", "lat": 1.0, "lng": 2.0, "zoom": 11}],
            "relationships": [{"map_id": 1, "marker_id": 1}]}"#,
    )
    .unwrap();

    mapsmarker()
        .arg("import")
        .arg(&file)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 layers, 1 maps, 1 markers, 1 relationships"));
}

#[test]
fn test_import_missing_file_fails() {
    mapsmarker()
        .args(["import", "/nonexistent/export.json", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

// === Stats Command Tests ===

#[test]
fn test_stats_help() {
    mapsmarker()
        .args(["stats", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("recent markers"));
}

// === Config Command Tests ===

#[test]
fn test_config_path_honors_flag() {
    mapsmarker()
        .args(["--config", "/tmp/mm-test.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/mm-test.toml"));
}

#[test]
fn test_config_init_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    mapsmarker()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[database]"));
    assert!(written.contains("[layar]"));
}

// === Completions Tests ===

#[test]
fn test_completions_bash() {
    mapsmarker()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mapsmarker"));
}
