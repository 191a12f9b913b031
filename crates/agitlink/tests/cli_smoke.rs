mod support;

use std::collections::HashMap;
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use support::{FakeWindow, serve};

/// The binary with a predictable environment: no user config, no inherited overrides.
fn agitlink(scratch: &Path) -> Command {
    let mut cmd = Command::cargo_bin("agitlink").expect("binary exists");
    cmd.env_remove("winid")
        .env_remove("NAMESPACE")
        .env_remove("AGITLINK_HOST")
        .env_remove("AGITLINK_LOG")
        .env("USER", "glenda")
        .env("AGITLINK_CONFIG", scratch.join("missing-config.toml"));
    cmd
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(["-c", "user.name=agitlink", "-c", "user.email=agitlink@example.com"])
        .args(args)
        .current_dir(dir)
        .stderr(Stdio::null())
        .output()
        .expect("run git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8(output.stdout).expect("utf-8 git output")
}

fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn help_displays_usage() {
    let scratch = tempfile::tempdir().unwrap();
    agitlink(scratch.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--winid"));
}

#[test]
fn missing_winid_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    agitlink(scratch.path())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::starts_with(
            "agitlink: $winid not set - not running inside acme?",
        ));
}

#[test]
fn invalid_winid_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    agitlink(scratch.path())
        .env("winid", "twelve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid $winid \"twelve\""));
}

#[test]
fn unreachable_acme_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    agitlink(scratch.path())
        .env("winid", "1")
        .env("NAMESPACE", scratch.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("agitlink: cannot connect to acme at"));
}

#[test]
fn prints_permalink_for_acme_selection() {
    if !git_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let repo = scratch.path().join("repo");
    fs::create_dir_all(repo.join("src")).unwrap();
    let body = "fn one() {}\nfn two() {}\nfn three() {}\n";
    fs::write(repo.join("src/lib.rs"), body).unwrap();
    git(&repo, &["init", "--quiet"]);
    git(&repo, &["remote", "add", "origin", "git@github.com:owner/repo.git"]);
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "--quiet", "-m", "init"]);
    let commit = git(&repo, &["rev-parse", "HEAD"]).trim().to_owned();

    let namespace = scratch.path().join("ns");
    fs::create_dir_all(&namespace).unwrap();
    let listener = UnixListener::bind(namespace.join("acme")).unwrap();
    let tag = format!("{} Del Snarf | Look", repo.join("src/lib.rs").display());
    // Select from the start of "two" through the end of "three".
    let window = FakeWindow::new(&tag, body, (12, 37));
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client connects");
        serve(stream, HashMap::from([(4, window)]), 3)
    });

    agitlink(scratch.path())
        .env("winid", "4")
        .env("NAMESPACE", &namespace)
        .assert()
        .success()
        .stdout(format!(
            "https://github.com/owner/repo.git/blob/{commit}/src/lib.rs#L2-L3\n"
        ));

    let log = server.join().unwrap();
    assert_eq!(log.opened, log.clunked);
}
