//! Runs the compiled `zt2rw` binary. None of these reach the network:
//! every case fails or finishes before a request would be made.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CREDENTIAL_VARS: &[&str] = &[
    "READWISE_TOKEN",
    "ZOTERO_KEY",
    "ZOTERO_LIBRARY_ID",
    "LIBRARY_TYPE",
];

fn run_zt2rw(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_zt2rw"));
    cmd.current_dir(dir).args(args).env("RUST_LOG", "off");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd.output().expect("failed to run zt2rw");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_config(dir: &Path, content: &str) -> String {
    let path = dir.join("zt2rw.toml");
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, ok) = run_zt2rw(tmp.path(), &["--help"], &[]);
    assert!(ok);
    assert!(stdout.contains("sync"));
    assert!(stdout.contains("export"));
    assert!(stdout.contains("check"));
}

#[test]
fn sync_without_credentials_fails_before_network() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["sync", "--progress", "off"], &[]);
    assert!(!ok);
    assert!(stderr.contains("ZOTERO_LIBRARY_ID"), "stderr: {}", stderr);
}

#[test]
fn sync_without_readwise_token_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_zt2rw(
        tmp.path(),
        &["sync"],
        &[("ZOTERO_LIBRARY_ID", "123"), ("ZOTERO_KEY", "abc")],
    );
    assert!(!ok);
    assert!(stderr.contains("READWISE_TOKEN"), "stderr: {}", stderr);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["--config", "nope.toml", "check"], &[]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[readwise]\nbatch_size = 0\n");
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["--config", &config, "sync"], &[]);
    assert!(!ok);
    assert!(stderr.contains("batch_size"), "stderr: {}", stderr);
}

#[test]
fn nothing_selected_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["sync", "--no-annotations"], &[]);
    assert!(!ok);
    assert!(stderr.contains("Nothing to sync"), "stderr: {}", stderr);
}

#[test]
fn bad_library_type_in_env_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["sync"], &[("LIBRARY_TYPE", "team")]);
    assert!(!ok);
    assert!(stderr.contains("LIBRARY_TYPE"), "stderr: {}", stderr);
}

#[test]
fn check_reports_missing_credentials() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, ok) = run_zt2rw(tmp.path(), &["check"], &[]);
    assert!(!ok);
    assert!(stdout.contains("zotero.api_key"));
    assert!(stdout.contains("MISSING"));
    assert!(stdout.contains("readwise"));
}

#[test]
fn dotenv_file_supplies_credentials() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".env"), "ZOTERO_LIBRARY_ID=123\nZOTERO_KEY=abc\n").unwrap();
    let (_, stderr, ok) = run_zt2rw(tmp.path(), &["sync"], &[]);
    assert!(!ok);
    // Zotero credentials were found; the Readwise token is the next thing missing.
    assert!(stderr.contains("READWISE_TOKEN"), "stderr: {}", stderr);
}
