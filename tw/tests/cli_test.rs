//! End-to-end tests for the `tw` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Run `tw` isolated inside `home`: store, config and log paths all live there
fn tw(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tw").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .arg("--store")
        .arg(home.path().join("store"));
    cmd
}

fn list_json(home: &TempDir) -> Vec<serde_json::Value> {
    let output = tw(home).args(["list", "--format", "json"]).output().unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_hash_command() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .args(["hash", "send_email", "--args", r#"["a@x.com"]"#, "--kwargs", r#"{"cc": null}"#])
        .assert()
        .success()
        .stdout("83251ff086908df4f3dbaafff6b2fdead2da3abc\n");
}

#[test]
fn test_hash_rejects_invalid_json() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .args(["hash", "noop", "--args", "[1,"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn test_schedule_twice_is_declined() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .args(["schedule", "reindex", "600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled Task(handler=reindex"));
    tw(&home)
        .args(["schedule", "reindex", "600"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not scheduled"));

    assert_eq!(list_json(&home).len(), 1);
}

#[test]
fn test_enqueue_complete_repeats() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .args(["enqueue", "digest", "--args", r#"["team"]"#, "--repeat", "daily"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enqueued Task(handler=digest"));

    let tasks = list_json(&home);
    assert_eq!(tasks.len(), 1);
    let id = tasks[0]["id"].as_str().unwrap().to_string();
    assert_eq!(tasks[0]["repeat_interval"], 86_400);

    tw(&home)
        .args(["complete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now completed"))
        .stdout(predicate::str::contains("Scheduled"));

    tw(&home)
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "completed""#));

    tw(&home)
        .args(["list", "--status", "waiting"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digest"))
        .stdout(predicate::str::contains("daily"));

    // the original is terminal now
    tw(&home).args(["fail", &id, "--error", "late"]).assert().failure();
}

#[test]
fn test_fail_records_error() {
    let home = TempDir::new().unwrap();
    tw(&home).args(["enqueue", "flaky"]).assert().success();
    let id = list_json(&home)[0]["id"].as_str().unwrap().to_string();

    tw(&home)
        .args(["fail", &id, "--error", "connection reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now failed"));

    tw(&home)
        .args(["list", "--status", "failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("connection reset"));
}

#[test]
fn test_due_lists_only_ready_tasks() {
    let home = TempDir::new().unwrap();
    tw(&home).args(["enqueue", "now"]).assert().success();
    tw(&home).args(["enqueue", "later", "--delay", "3600"]).assert().success();

    tw(&home)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("now"))
        .stdout(predicate::str::contains("later").not());
}

#[test]
fn test_missing_task() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .args(["show", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found"));
}

#[test]
fn test_migrate_empty_store() {
    let home = TempDir::new().unwrap();
    tw(&home)
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rehashed 0 task(s)"));
}

#[test]
fn test_config_file_is_used() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("tw.yml");
    std::fs::write(&config, "storage:\n  busy-timeout-ms: 0\n").unwrap();

    tw(&home)
        .arg("--config")
        .arg(&config)
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("busy-timeout-ms"));
}
