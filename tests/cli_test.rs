use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_help_lists_options() {
    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--stops"))
        .stdout(predicate::str::contains("--db-path"))
        .stdout(predicate::str::contains("--check-config"));
}

#[test]
fn test_cli_check_config_loads_stops() {
    let mut stops = tempfile::NamedTempFile::new().unwrap();
    writeln!(stops, "route_id, name, order, fare").unwrap();
    writeln!(stops, "1, Central, 1, 0").unwrap();
    writeln!(stops, "1, Harbour, 2, 40").unwrap();

    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.env_remove("RUST_LOG")
        .arg("--stops")
        .arg(stops.path())
        .arg("--check-config");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Configuration loaded"));
}

#[test]
fn test_cli_missing_stops_file_fails() {
    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.arg("--stops")
        .arg("does/not/exist.csv")
        .arg("--check-config");

    cmd.assert().failure();
}

#[test]
fn test_cli_rejects_inconsistent_catalogue() {
    let mut stops = tempfile::NamedTempFile::new().unwrap();
    writeln!(stops, "route_id, name, order, fare").unwrap();
    writeln!(stops, "1, Central, 1, 10").unwrap();
    writeln!(stops, "1, Harbour, 2, 5").unwrap();

    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.arg("--stops").arg(stops.path()).arg("--check-config");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("fare decreases"));
}
