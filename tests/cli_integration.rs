//! CLI integration tests for prefs
//!
//! Each test points the binary at a preferences file and a config file
//! inside its own temporary directory.

use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a command instance for the prefs binary
fn prefs_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("prefs"))
}

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn file(&self) -> PathBuf {
        self.dir.path().join("prefs.json")
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = prefs_cmd();
        cmd.env_remove("PREFS_FILE")
            .env_remove("PREFS_LOG")
            .arg("--file")
            .arg(self.file())
            .arg("--config")
            .arg(self.dir.path().join("config.toml"));
        cmd
    }
}

// =============================================================================
// Get / Set
// =============================================================================

#[test]
fn test_set_then_get_string() {
    let sb = Sandbox::new();

    sb.cmd()
        .args(["set", "theme", "dark"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set theme"));

    sb.cmd()
        .args(["get", "theme"])
        .assert()
        .success()
        .stdout("dark\n");

    assert!(sb.file().is_file());
    assert!(!sb.dir.path().join("prefs.json.bak").exists());
}

#[test]
fn test_set_same_value_reports_unchanged() {
    let sb = Sandbox::new();

    sb.cmd().args(["set", "n", "5", "--kind", "int"]).assert().success();

    sb.cmd()
        .args(["set", "n", "5", "--kind", "int"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unchanged n"));
}

#[test]
fn test_set_typed_values() {
    let sb = Sandbox::new();

    sb.cmd().args(["set", "count", "42", "--kind", "int"]).assert().success();
    sb.cmd().args(["set", "big", "9000000000", "--kind", "long"]).assert().success();
    sb.cmd().args(["set", "ratio", "0.5", "--kind", "float"]).assert().success();
    sb.cmd().args(["set", "on", "true", "--kind", "bool"]).assert().success();
    sb.cmd().args(["set", "tags", "b,a", "--kind", "set"]).assert().success();

    sb.cmd().args(["get", "big"]).assert().success().stdout("9000000000\n");
    sb.cmd().args(["get", "tags"]).assert().success().stdout("a,b\n");

    let content = fs::read_to_string(sb.file()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["entries"]["count"]["type"], "int");
    assert_eq!(doc["entries"]["count"]["value"], 42);
    assert_eq!(doc["entries"]["big"]["type"], "long");
    assert_eq!(doc["entries"]["on"]["type"], "boolean");
    assert_eq!(doc["entries"]["tags"]["type"], "string_set");
    assert_eq!(doc["entries"]["tags"]["value"], serde_json::json!(["a", "b"]));
}

#[test]
fn test_set_rejects_invalid_value() {
    let sb = Sandbox::new();

    sb.cmd()
        .args(["set", "n", "many", "--kind", "int"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Cannot store value: Invalid int value: many"));

    assert!(!sb.file().exists());
}

#[test]
fn test_set_nan_float_persists() {
    let sb = Sandbox::new();

    sb.cmd().args(["set", "r", "NaN", "--kind", "float"]).assert().success();
    sb.cmd().args(["set", "s", "x"]).assert().success();

    sb.cmd().args(["get", "r"]).assert().success().stdout("NaN\n");
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(sb.file()).unwrap()).unwrap();
    assert_eq!(doc["entries"]["r"]["value"], "NaN");
}

#[test]
fn test_get_missing_key_fails() {
    let sb = Sandbox::new();

    sb.cmd()
        .args(["get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key not found: nope"));
}

#[test]
fn test_get_missing_key_with_default() {
    let sb = Sandbox::new();

    sb.cmd()
        .args(["get", "nope", "--default", "fallback"])
        .assert()
        .success()
        .stdout("fallback\n");
}

#[test]
fn test_get_json_format() {
    let sb = Sandbox::new();
    sb.cmd().args(["set", "n", "3", "--kind", "int"]).assert().success();

    let output = sb
        .cmd()
        .args(["--format", "json", "get", "n"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["key"], "n");
    assert_eq!(json["type"], "int");
    assert_eq!(json["value"], 3);
}

// =============================================================================
// Remove / Clear / Contains / List
// =============================================================================

#[test]
fn test_remove_and_contains() {
    let sb = Sandbox::new();
    sb.cmd().args(["set", "k", "v"]).assert().success();

    sb.cmd().args(["contains", "k"]).assert().success().stdout("true\n");

    sb.cmd()
        .args(["remove", "k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed k"));

    sb.cmd().args(["contains", "k"]).assert().success().stdout("false\n");

    sb.cmd()
        .args(["remove", "k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not present k"));
}

#[test]
fn test_clear_removes_everything() {
    let sb = Sandbox::new();
    sb.cmd().args(["set", "a", "1"]).assert().success();
    sb.cmd().args(["set", "b", "2"]).assert().success();

    sb.cmd()
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2 entries"));

    sb.cmd().arg("list").assert().success().stdout("");
}

#[test]
fn test_list_is_sorted() {
    let sb = Sandbox::new();
    sb.cmd().args(["set", "zeta", "z"]).assert().success();
    sb.cmd().args(["set", "alpha", "a"]).assert().success();
    sb.cmd().args(["set", "mid", "7", "--kind", "int"]).assert().success();

    sb.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout("alpha\tstring\ta\nmid\tint\t7\nzeta\tstring\tz\n");
}

#[test]
fn test_list_json_format() {
    let sb = Sandbox::new();
    sb.cmd().args(["set", "b", "2"]).assert().success();
    sb.cmd().args(["set", "a", "1"]).assert().success();

    let output = sb.cmd().args(["-f", "json", "list"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["key"], "a");
    assert_eq!(items[1]["key"], "b");
}

// =============================================================================
// Recovery and configuration
// =============================================================================

#[test]
fn test_backup_wins_over_partial_primary() {
    let sb = Sandbox::new();
    fs::write(
        sb.dir.path().join("prefs.json.bak"),
        r#"{"version":1,"entries":{"k":{"type":"string","value":"saved"}}}"#,
    )
    .unwrap();
    fs::write(sb.file(), "{\"version\":1,\"entr").unwrap();

    sb.cmd().args(["get", "k"]).assert().success().stdout("saved\n");
}

#[test]
fn test_corrupt_file_reads_as_empty() {
    let sb = Sandbox::new();
    fs::write(sb.file(), "not json").unwrap();

    sb.cmd().arg("list").assert().success().stdout("");
    sb.cmd().args(["set", "k", "v"]).assert().success();
    sb.cmd().args(["get", "k"]).assert().success().stdout("v\n");
}

#[test]
fn test_missing_parent_directory_is_created() {
    let sb = Sandbox::new();
    let nested = sb.dir.path().join("a").join("b").join("prefs.json");

    prefs_cmd()
        .env_remove("PREFS_FILE")
        .arg("--file")
        .arg(&nested)
        .arg("--config")
        .arg(sb.dir.path().join("config.toml"))
        .args(["set", "k", "v"])
        .assert()
        .success();

    assert!(nested.is_file());
}

#[test]
fn test_default_file_from_config() {
    let sb = Sandbox::new();
    let config = sb.dir.path().join("config.toml");
    let target = sb.dir.path().join("configured.json");
    fs::write(&config, format!("default_file = {:?}\n", target.display().to_string())).unwrap();

    prefs_cmd()
        .env_remove("PREFS_FILE")
        .arg("--config")
        .arg(&config)
        .args(["set", "k", "v"])
        .assert()
        .success();

    assert!(target.is_file());
}

#[test]
fn test_malformed_config_fails() {
    let sb = Sandbox::new();
    fs::write(sb.dir.path().join("config.toml"), "mode = ").unwrap();

    sb.cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_verbose_flag_logs_to_stderr() {
    let sb = Sandbox::new();

    sb.cmd()
        .args(["--verbose", "set", "k", "v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set k"))
        .stderr(predicate::str::contains("DEBUG"));
}
