//! End-to-end tests driving the `harvest` binary for the offline
//! commands (stats, diagnose). The analyze and recover paths need a
//! server and are covered by the scripted-scanner tests instead.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn harvest_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("harvest");
    path
}

const HEADER: &str =
    "owner,name,stars,forks,language,release_count,contributors,median_release_interval,release_type,reason";

fn write_csv(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join("repos.csv");
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn stats_prints_composition_counters() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            "bob,daemon,40,2,Go,4,3,90.0,slow,",
            "carol,parser,9,1,C,2,1,30.0,unclassified,",
        ],
    );

    let output = Command::new(harvest_binary())
        .arg("stats")
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(output.status.success(), "{:?}", output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("repositories   3"), "{stdout}");
    assert!(stdout.contains("rapid        1"), "{stdout}");
    assert!(stdout.contains("slow         1"), "{stdout}");
    assert!(stdout.contains("pending        3"), "{stdout}");
}

#[test]
fn stats_json_is_machine_readable() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(tmp.path(), &["alice,webapp,120,14,Rust,20,5,7.5,rapid,"]);

    let output = Command::new(harvest_binary())
        .args(["stats", "--json"])
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(output.status.success(), "{:?}", output);

    let stats: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stats --json must emit valid JSON");
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["rapid"], 1);
    assert_eq!(stats["analyzed"], 0);
}

#[test]
fn stats_on_a_corrupt_file_fails_with_the_row_number() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            "bob,daemon,40,2,Go,4,3,90.0,slow",
        ],
    );

    let output = Command::new(harvest_binary())
        .arg("stats")
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("row 3"), "{stderr}");
    assert!(stderr.contains("harvest diagnose"), "{stderr}");
}

#[test]
fn diagnose_report_mode_exits_zero_and_modifies_nothing() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            "bob,daemon,40,2,Go,4,3,90.0,slow",
        ],
    );
    let before = fs::read_to_string(&path).unwrap();

    let output = Command::new(harvest_binary())
        .arg("diagnose")
        .arg(&path)
        .output()
        .expect("failed to run harvest");

    // A damaged input is a finding, not a failure.
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("problems:  1"), "{stdout}");
    assert!(stdout.contains("field count 9"), "{stdout}");

    assert_eq!(fs::read_to_string(&path).unwrap(), before);
    assert!(!tmp.path().join("repos_fixed.csv").exists());
}

#[test]
fn diagnose_fix_writes_the_fixed_sibling() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            ",bob,daemon,40,2,Go,4,3,90.0,slow,",
        ],
    );

    let output = Command::new(harvest_binary())
        .args(["diagnose", "--fix"])
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(output.status.success(), "{:?}", output);

    let fixed = tmp.path().join("repos_fixed.csv");
    assert!(fixed.exists());
    let body = fs::read_to_string(&fixed).unwrap();
    assert!(body.contains("bob,daemon,40"), "{body}");
}

#[test]
fn diagnose_json_report_parses() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &["garbage,row,with,far,too,many,fields,1,2,3,4,5"],
    );

    let output = Command::new(harvest_binary())
        .args(["diagnose", "--json"])
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(output.status.success(), "{:?}", output);

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("diagnose --json must emit valid JSON");
    assert_eq!(report["data_rows"], 1);
    assert_eq!(report["problems"][0]["row"], 2);
    assert_eq!(report["problems"][0]["kind"], "field_count");
}

#[test]
fn analyze_rejects_an_unknown_release_type() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(tmp.path(), &["alice,webapp,120,14,Rust,20,5,7.5,rapid,"]);

    let output = Command::new(harvest_binary())
        .args(["analyze", "--release-type", "weekly"])
        .arg(&path)
        .output()
        .expect("failed to run harvest");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown release type"), "{stderr}");
}
