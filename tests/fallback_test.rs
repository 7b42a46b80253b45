use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn stops_file() -> tempfile::NamedTempFile {
    let mut stops = tempfile::NamedTempFile::new().unwrap();
    writeln!(stops, "route_id, name, order, fare").unwrap();
    writeln!(stops, "1, Central, 1, 0").unwrap();
    writeln!(stops, "1, Harbour, 2, 40").unwrap();
    stops
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let stops = stops_file();

    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.arg("--stops")
        .arg(stops.path())
        .arg("--db-path")
        .arg("some_db")
        .arg("--check-config");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let stops = stops_file();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("transit-ticketing"));
    cmd.arg("--stops")
        .arg(stops.path())
        .arg("--db-path")
        .arg(&db_path)
        .arg("--check-config");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
