use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("encrustctl");
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for sub in [
        "fatten", "validate", "build", "sign", "notarize", "release", "auth",
        "configure",
    ] {
        assert!(text.contains(sub), "help missing '{sub}' subcommand");
    }
    assert!(text.contains("--parallelism"), "help missing --parallelism");
}

#[test]
fn validate_help_documents_paths() {
    let mut cmd = cargo_bin_cmd!("encrustctl");
    cmd.arg("validate")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[PATHS]..."));
}

#[test]
fn fatten_help_mentions_wheel_dir() {
    let mut cmd = cargo_bin_cmd!("encrustctl");
    cmd.arg("fatten")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--wheel-dir"));
}

#[test]
fn configure_prints_template_for_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encrust.json");
    let mut cmd = cargo_bin_cmd!("encrustctl");
    cmd.arg("--config")
        .arg(&path)
        .arg("configure")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"teamID\""))
        .stdout(predicate::str::contains(path.display().to_string()));
}

#[test]
fn missing_config_fails_before_running_tools() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("encrustctl");
    cmd.arg("--config")
        .arg(dir.path().join("absent.json"))
        .arg("sign")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}
