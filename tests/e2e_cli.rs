//! CLI behavior that needs no network: usage errors, configuration errors
//! and the exit status of each failure kind.


use assert_cmd::prelude::*;
use cli_helpers::{base_cmd, cmd_with_credentials, write_config};
use predicates::prelude::*;
use tempfile::TempDir;

fn setup_temp_home() -> TempDir {
    TempDir::new().expect("failed to create temp home")
}

#[test]
fn missing_subcommand_is_usage_error() {
    let home = setup_temp_home();
    base_cmd(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_commands() {
    let home = setup_temp_home();
    base_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("rate"));
}

#[test]
fn invalid_month_is_config_error() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["report", "--month", "2024-13"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid month"));
}

#[test]
fn missing_credentials_is_config_error_and_writes_nothing() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["report", "--month", "2024-03", "--keys", "missing_keys.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("KRAKEN_API_KEY"))
        .stdout(predicate::str::is_empty());

    assert!(!home.path().join("rfb-2024-03.txt").exists());
}

#[test]
fn malformed_key_file_is_config_error() {
    let home = setup_temp_home();
    std::fs::write(home.path().join("kraken_keys.json"), "not json").unwrap();
    base_cmd(&home)
        .args(["report", "--month", "2024-03"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid key file"));
}

#[test]
fn undecodable_secret_is_authentication_error() {
    let home = setup_temp_home();
    cmd_with_credentials(&home, "***not-base64***")
        .args(["report", "--month", "2024-03"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("authentication failed"));

    assert!(!home.path().join("rfb-2024-03.txt").exists());
}

#[test]
fn invalid_threshold_is_config_error() {
    let home = setup_temp_home();
    cmd_with_credentials(&home, "c2VjcmV0")
        .args(["report", "--month", "2024-03", "--threshold", "lots"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid amount"));
}

#[test]
fn invalid_config_file_is_config_error() {
    let home = setup_temp_home();
    let config = write_config(&home, "[kraken\napi_url = ");
    base_cmd(&home)
        .arg("--config")
        .arg(&config)
        .args(["rate", "USD", "2024-03-01"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn rate_with_bad_date_is_config_error() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["rate", "BTC", "yesterday"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid date"));
}

#[test]
fn rate_for_future_date_is_unavailable() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["rate", "BTC", "2999-01-01"])
        .assert()
        .code(13)
        .stderr(predicate::str::contains("future"));
}

#[test]
fn identity_rate_needs_no_network() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["--json", "rate", "brl", "2024-03-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""rate": "1""#))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn unsupported_fiat_pair_is_unavailable() {
    let home = setup_temp_home();
    base_cmd(&home)
        .args(["rate", "AED", "2024-03-01"])
        .assert()
        .code(13)
        .stderr(predicate::str::contains("unsupported pair"));
}
