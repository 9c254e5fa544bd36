//! Smoke tests for the reqdb binary

use assert_cmd::Command;
use predicates::prelude::*;

fn reqdb(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reqdb").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("REQDB_CONFIG")
        .env_remove("REQDB_DATABASE_NAME")
        .env_remove("REQDB_DATABASE_ENGINE")
        .env_remove("REQDB_AUTOCOMMIT");
    cmd
}

#[test]
fn test_serve_help() {
    let dir = tempfile::tempdir().unwrap();
    reqdb(&dir)
        .arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Insert sample users"));
}

#[test]
fn test_engines_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    reqdb(&dir)
        .arg("engines")
        .assert()
        .success()
        .stdout(predicate::str::contains("postgres\nsqlite"));
}

#[test]
fn test_check_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("reqdb.toml");
    std::fs::write(
        &config,
        r#"
        [database]
        name = "data/app.db"
        engine = "sqlite3"
        autocommit = true
        "#,
    )
    .unwrap();

    reqdb(&dir)
        .arg("check")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: engine=sqlite name=data/app.db autocommit=true"));

    // check never creates the database file
    assert!(!dir.path().join("data/app.db").exists());
}

#[test]
fn test_check_unknown_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("reqdb.toml");
    std::fs::write(&config, "[database]\nname = \"x.db\"\nengine = \"oracle\"\n").unwrap();

    reqdb(&dir)
        .arg("check")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("database engine not found"));
}

#[test]
fn test_env_overrides_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("reqdb.toml");
    std::fs::write(&config, "[database]\nname = \"x.db\"\nengine = \"sqlite\"\n").unwrap();

    reqdb(&dir)
        .arg("check")
        .arg("--config")
        .arg(&config)
        .env("REQDB_DATABASE_ENGINE", "mongo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"mongo\""));
}
