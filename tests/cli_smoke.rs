//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_help_lists_lifecycle_subcommands() {
    let mut cmd = cargo_bin_cmd!("cherry-machine");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(contains("Provision and manage Cherry Servers machines"))
        .stdout(contains("create"))
        .stdout(contains("status"));
}

#[test]
fn cli_reports_missing_credentials_before_any_remote_call() {
    let mut cmd = cargo_bin_cmd!("cherry-machine");
    cmd.env_remove("CHERRYSERVERS_AUTH_TOKEN");
    cmd.env("RUST_LOG", "off");
    cmd.args(["status", "1234"]);

    cmd.assert()
        .failure()
        .code(1)
        .stdout("")
        .stderr(contains("configuration error"));
}
