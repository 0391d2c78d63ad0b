//! Smoke tests that invoke the `pagescope` binary.
//!
//! HOME and the working directory point at a temp directory so the user's
//! real config files are never read.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn pagescope(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pagescope").expect("pagescope binary should be built");
    cmd.env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("PAGESCOPE_PORT")
        .env_remove("PAGESCOPE_HOST")
        .current_dir(home);
    cmd
}

#[test]
fn lists_all_audits() {
    let home = tempfile::tempdir().expect("temp dir");
    pagescope(home.path())
        .arg("--list-all-audits")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"time-to-interactive\""))
        .stdout(predicate::str::contains("\"requiredArtifacts\""));
}

#[test]
fn lists_trace_categories_from_config() {
    let home = tempfile::tempdir().expect("temp dir");
    let config_dir = home.path().join(".pagescope");
    std::fs::create_dir_all(&config_dir).expect("should create config dir");
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
[[passes]]
name = "defaultPass"
trace_categories = ["toplevel", "custom.category"]
gatherers = ["url", "scrolling", "media-sized", "mutation-events"]

[[passes]]
name = "scrolling"
trace_categories = ["toplevel"]
"#,
    )
    .expect("should write config");

    pagescope(home.path())
        .arg("--list-trace-categories")
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.category"));
}

#[test]
fn url_is_required() {
    let home = tempfile::tempdir().expect("temp dir");
    pagescope(home.path()).assert().failure();
}

#[test]
fn missing_explicit_config_fails() {
    let home = tempfile::tempdir().expect("temp dir");
    pagescope(home.path())
        .args(["--config-path", "absent.toml", "--skip-launch", "https://example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn unreachable_endpoint_reports_failed_url() {
    let home = tempfile::tempdir().expect("temp dir");
    pagescope(home.path())
        .env("PAGESCOPE_READY_RETRIES", "1")
        .args(["--skip-launch", "--port", "1", "--quiet", "https://example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 URL(s) could not be audited"));
}

#[test]
fn verbose_logs_where_config_fields_came_from() {
    let home = tempfile::tempdir().expect("temp dir");
    let config_dir = home.path().join(".pagescope");
    std::fs::create_dir_all(&config_dir).expect("should create config dir");
    std::fs::write(config_dir.join("config.toml"), "[driver]\nport = 9333\n")
        .expect("should write config");

    pagescope(home.path())
        .args(["--verbose", "--list-trace-categories"])
        .assert()
        .success()
        .stderr(predicate::str::contains("config field overridden"))
        .stderr(predicate::str::contains("driver.port"))
        .stderr(predicate::str::contains("user file"));
}
