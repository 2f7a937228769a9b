use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const USERS: &str = r#"
[anonymous]
name = "guest"
roles = ["Public"]

[[users]]
name = "jduke"
password = "theduke"
roles = ["Echo", "Admin"]
caller = "duke@corp"
"#;

fn callerid_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("callerid").unwrap();
    cmd.env("CALLERID_CONFIG", dir.path().join("callerid.toml"));
    cmd.env_remove("CALLERID_PASSWORD");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn users_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("users.toml");
    std::fs::write(&path, USERS).unwrap();
    path
}

// ── basics ───────────────────────────────────────────────────────────

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    callerid_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("authentication caching"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    callerid_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("callerid"));
}

// ── config ───────────────────────────────────────────────────────────

#[test]
fn test_config_show_defaults_without_file() {
    let dir = TempDir::new().unwrap();
    callerid_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[manager]"))
        .stdout(predicate::str::contains("locking = \"serialized\""))
        .stdout(predicate::str::contains("mode = \"isolated\""));
}

#[test]
fn test_config_init_then_refuse_overwrite() {
    let dir = TempDir::new().unwrap();
    callerid_cmd(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("callerid.toml").exists());

    callerid_cmd(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("already exists"));

    callerid_cmd(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("callerid.toml"),
        "[association]\nmode = \"isolated_inheriting\"\n",
    )
    .unwrap();
    let output = callerid_cmd(&dir)
        .args(["config", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["association"]["mode"], "isolated_inheriting");
    assert_eq!(json["cache"]["default_lifetime_secs"], 1800);
}

#[test]
fn test_invalid_config_exit_code() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("callerid.toml"), "[manager]\nlocking = \"eager\"\n").unwrap();
    callerid_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Invalid config"));
}

// ── check ────────────────────────────────────────────────────────────

#[test]
fn test_check_reports_cache_hit() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    callerid_cmd(&dir)
        .args(["check", "--users"])
        .arg(&users)
        .args(["jduke", "--password", "theduke"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 authenticator calls, 1 cache hits"))
        .stdout(predicate::str::contains("caller principal: duke@corp"));
}

#[test]
fn test_check_json() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    let output = callerid_cmd(&dir)
        .args(["check", "--json", "--repeat", "3", "--users"])
        .arg(&users)
        .arg("jduke")
        .env("CALLERID_PASSWORD", "theduke")
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["principal"], "jduke");
    assert_eq!(json["attempts"], 3);
    assert_eq!(json["authenticator_calls"], 1);
    assert_eq!(json["cache_hits"], 2);
    assert_eq!(json["caller_principal"], "duke@corp");
    assert_eq!(json["cached_principals"][0], "jduke");
    let roles: Vec<&str> = json["roles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert!(roles.contains(&"Admin"));
}

#[test]
fn test_check_anonymous() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    callerid_cmd(&dir)
        .args(["check", "--users"])
        .arg(&users)
        .assert()
        .success()
        .stdout(predicate::str::contains("<anonymous> authenticated"))
        .stdout(predicate::str::contains("roles: Public"));
}

#[test]
fn test_check_bad_password() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    callerid_cmd(&dir)
        .args(["check", "--users"])
        .arg(&users)
        .args(["jduke", "--password", "wrong"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_check_bad_password_json_error() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    let output = callerid_cmd(&dir)
        .args(["check", "--json", "--users"])
        .arg(&users)
        .args(["nobody", "--password", "x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["error"]["code"], "auth_failed");
    assert_eq!(json["error"]["exit_code"], 2);
}

#[test]
fn test_check_missing_users_file() {
    let dir = TempDir::new().unwrap();
    callerid_cmd(&dir)
        .args(["check", "--users"])
        .arg(dir.path().join("absent.toml"))
        .arg("jduke")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

// ── stampede ─────────────────────────────────────────────────────────

#[test]
fn test_stampede_serialized_calls_once() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    let output = callerid_cmd(&dir)
        .args(["stampede", "--json", "--threads", "4", "--delay-ms", "100"])
        .args(["--locking", "serialized", "--password", "theduke", "--users"])
        .arg(&users)
        .arg("jduke")
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["locking"], "serialized");
    assert_eq!(json["successes"], 4);
    assert_eq!(json["authenticator_calls"], 1);
}

#[test]
fn test_stampede_simple() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    callerid_cmd(&dir)
        .args(["stampede", "--threads", "3", "--locking", "simple"])
        .args(["--password", "theduke", "--users"])
        .arg(&users)
        .arg("jduke")
        .assert()
        .success()
        .stdout(predicate::str::contains("(simple locking): 3 succeeded"));
}

#[test]
fn test_stampede_unknown_locking() {
    let dir = TempDir::new().unwrap();
    let users = users_file(&dir);
    callerid_cmd(&dir)
        .args(["stampede", "--locking", "eager", "--users"])
        .arg(&users)
        .arg("jduke")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("unknown locking strategy"));
}
