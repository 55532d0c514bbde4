//! CLI integration tests for the Lavega command-line interface.
//!
//! Every test runs with its own `LAVEGA_CONFIG_DIR` and working directory, so
//! nothing here reads the developer's real config or talks to Google.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use lavega_auth::store::EncryptedFileStore;
use lavega_auth::{TokenSet, TokenStore};

/// Unsigned ID token for `{"name":"Ann","email":"a@x.com"}`.
const ANN_ID_TOKEN: &str = "eyJhbGciOiJSUzI1NiJ9.eyJuYW1lIjoiQW5uIiwiZW1haWwiOiJhQHguY29tIn0.sig";

/// Get a command for the lavega binary in an isolated environment.
fn lavega(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lavega").unwrap();
    cmd.env("LAVEGA_CONFIG_DIR", dir.path())
        .env_remove("LAVEGA_CLIENT_SECRET")
        .env_remove("RUST_LOG")
        .current_dir(dir.path());
    cmd
}

fn write_config(dir: &Path, body: &str) {
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lavega"))
        .stdout(predicate::str::contains("app"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lavega"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    lavega(&dir).arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_without_session() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("signed out"));
}

#[test]
fn test_status_json_without_session() {
    let dir = TempDir::new().unwrap();
    let output = lavega(&dir).args(["--json", "status"]).output().unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["signed_in"], false);
    assert_eq!(status["storage"], "encrypted");
}

// With keyring support the CLI keeps its master key in the system keyring,
// so a session sealed with a file key would be migrated there.
#[cfg(not(feature = "keyring"))]
#[tokio::test]
async fn test_status_reads_encrypted_session() {
    let dir = TempDir::new().unwrap();
    EncryptedFileStore::new(dir.path())
        .try_save(&TokenSet::new(
            "access",
            Some("refresh".to_string()),
            Some(ANN_ID_TOKEN.to_string()),
        ))
        .await
        .unwrap();

    let output = lavega(&dir).args(["--json", "status"]).output().unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["signed_in"], true);
    assert_eq!(status["name"], "Ann");
    assert_eq!(status["email"], "a@x.com");
    assert_eq!(status["has_refresh_token"], true);
}

#[tokio::test]
async fn test_logout_removes_session() {
    let dir = TempDir::new().unwrap();
    let store = EncryptedFileStore::new(dir.path());
    store
        .try_save(&TokenSet::new("access", None, Some(ANN_ID_TOKEN.to_string())))
        .await
        .unwrap();

    lavega(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!dir.path().join("tokens.age").exists());

    lavega(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored session"));
}

#[test]
fn test_logout_removes_undecryptable_session() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("tokens.age"), "sealed to a lost key").unwrap();

    lavega(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!dir.path().join("tokens.age").exists());
    assert!(!dir.path().join("master.key").exists());
}

#[test]
fn test_status_rejects_out_of_range_leeway() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        "[session]\nexpiry_leeway_secs = 9223372036854775807\n",
    );

    lavega(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expiry_leeway_secs"));
}

#[test]
fn test_login_requires_client_id() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("client_id"));
}

#[test]
fn test_refresh_without_session_fails() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "[oauth]\nclient_id = \"test-client\"\n");

    lavega(&dir)
        .arg("refresh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No stored session"));
}

#[test]
fn test_memory_storage_reports_signed_out() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "[storage]\nbackend = \"memory\"\n");

    let output = lavega(&dir).args(["--json", "status"]).output().unwrap();
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["storage"], "memory");
    assert_eq!(status["signed_in"], false);
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_env_override() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(dir.path().to_string_lossy().as_ref()));
}

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    lavega(&dir)
        .args(["config", "init", "--client-id", "abc.apps.googleusercontent.com"])
        .assert()
        .success();

    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("abc.apps.googleusercontent.com"));

    lavega(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc.apps.googleusercontent.com"))
        .stdout(predicate::str::contains("https://oauth2.googleapis.com/token"));

    lavega(&dir)
        .args(["config", "init", "--client-id", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_plaintext_secret_is_masked_in_json() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        "[oauth]\nclient_id = \"id\"\nclient_secret = \"super-secret\"\n",
    );

    lavega(&dir)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****"))
        .stdout(predicate::str::contains("super-secret").not());
}
