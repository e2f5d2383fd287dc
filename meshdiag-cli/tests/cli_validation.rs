use std::io::Write;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::{NamedTempFile, TempDir};

fn meshdiag() -> Command {
    let mut cmd = Command::cargo_bin("meshdiag").unwrap();
    cmd.env_remove("MESHDIAG_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    meshdiag()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ping"))
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("peers"))
        .stdout(predicate::str::contains("log"))
        .stdout(predicate::str::contains("kill"));
}

#[test]
fn ping_rejects_ambiguous_target() {
    meshdiag()
        .args(["ping", "example.org"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid target"));
}

#[test]
fn route_rejects_truncated_path() {
    meshdiag()
        .args(["route", "0000.0000.000.0013"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid path"));
}

#[test]
fn peers_rejects_bad_ipv6() {
    meshdiag()
        .args(["peers", "fc00:xyz::1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid IPv6 address"));
}

#[test]
fn missing_tool_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    meshdiag()
        .arg("--config")
        .arg(&missing)
        .arg("dump")
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn empty_admin_password_is_rejected_before_connecting() {
    let mut daemon_conf = NamedTempFile::new().unwrap();
    writeln!(
        daemon_conf,
        "{{\n  // admin\n  \"admin\": {{ \"bind\": \"127.0.0.1:11234\", \"password\": \"\" }}\n}}"
    )
    .unwrap();
    meshdiag()
        .arg("-f")
        .arg(daemon_conf.path())
        .arg("dump")
        .assert()
        .failure()
        .stderr(predicate::str::contains("admin password is empty"));
}

#[test]
fn admin_file_is_taken_from_tool_config() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("meshdiag.toml");
    let absent = dir.path().join("no-daemon.conf");
    std::fs::write(&cfg, format!("admin_file = {:?}\n", absent.display().to_string())).unwrap();
    meshdiag()
        .arg("--config")
        .arg(&cfg)
        .args(["ping", "-c", "1", "fc00::1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-daemon.conf"));
}
