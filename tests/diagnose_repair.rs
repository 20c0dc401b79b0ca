//! Integration tests for the corruption diagnostic: exact row reporting,
//! unambiguous realignment, truncation at the first unrepairable row, and
//! the report-only guarantee that the input is never modified.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use sonar_harvest::diagnose::{
    diagnose_file, DiagnoseOptions, ProblemKind, RepairAction,
};
use sonar_harvest::store::{fixed_sibling, Store};

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
fn report_mode_finds_rows_and_leaves_input_untouched() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            "bob,daemon,40,2,Go,4,3,90.0,slow", // row 3: 9 fields
            "carol,parser,9,1,C,2,1,30.0,slow,",
        ],
    );
    let before = fs::read_to_string(&path).unwrap();

    let report = diagnose_file(&path, &DiagnoseOptions::default()).unwrap();

    assert_eq!(report.data_rows, 3);
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.problems[0].row, 3);
    assert_eq!(
        report.problems[0].kind,
        ProblemKind::FieldCount {
            expected: 10,
            found: 9
        }
    );
    assert_eq!(report.problems[0].action, RepairAction::Reported);
    assert!(report.output.is_none());

    assert_eq!(fs::read_to_string(&path).unwrap(), before);
    assert!(!fixed_sibling(&path).exists());
}

#[test]
fn oversized_field_is_flagged_with_column_and_size() {
    let tmp = TempDir::new().unwrap();
    let runaway = "x".repeat(64);
    let row = format!("alice,webapp,120,14,{},20,5,7.5,rapid,", runaway);
    let path = write_csv(tmp.path(), &[&row]);

    let opts = DiagnoseOptions {
        max_field_bytes: 32,
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.problems.len(), 1);
    assert_eq!(
        report.problems[0].kind,
        ProblemKind::OversizedField {
            column: 5,
            bytes: 64
        }
    );
}

#[test]
fn fix_realigns_shifted_row() {
    let tmp = TempDir::new().unwrap();
    // Row 3 carries a spurious empty leading field (11 fields).
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            ",bob,daemon,40,2,Go,4,3,90.0,slow,",
        ],
    );

    let opts = DiagnoseOptions {
        fix: true,
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.rows_kept, 2);
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.problems[0].action, RepairAction::Realigned);

    // The repaired sibling loads cleanly with both identities intact.
    let out = report.output.unwrap();
    assert_eq!(out, fixed_sibling(&path));
    let store = Store::open_exact(&out).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.find("bob", "daemon").is_some());
}

#[test]
fn fix_splits_composite_identity() {
    let tmp = TempDir::new().unwrap();
    // Row 2 lost the owner/name delimiter (9 fields, composite first).
    let path = write_csv(tmp.path(), &["bob/daemon,40,2,Go,4,3,90.0,slow,"]);

    let opts = DiagnoseOptions {
        fix: true,
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.rows_kept, 1);
    assert_eq!(report.problems[0].action, RepairAction::Realigned);

    let store = Store::open_exact(&report.output.unwrap()).unwrap();
    assert_eq!(store.records()[0].full_name(), "bob/daemon");
    assert_eq!(store.records()[0].stars, 40);
}

#[test]
fn fix_truncates_at_first_unrepairable_row() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "alice,webapp,120,14,Rust,20,5,7.5,rapid,",
            "garbage,row,with,far,too,many,fields,1,2,3,4,5", // row 3: broken
            "carol,parser,9,1,C,2,1,30.0,slow,",              // row 4: clean but past cut
        ],
    );

    let opts = DiagnoseOptions {
        fix: true,
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.rows_kept, 1);
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.problems[0].row, 3);
    assert_eq!(report.problems[0].action, RepairAction::Dropped);

    let store = Store::open_exact(&report.output.unwrap()).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.records()[0].full_name(), "alice/webapp");
}

#[test]
fn truncate_at_keeps_exactly_the_prefix() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        &[
            "a,one,1,0,Rust,10,2,5.0,rapid,",
            "b,two,1,0,Rust,10,2,6.0,rapid,",
            "c,three,1,0,Go,2,1,120.0,slow", // damaged, but past the cut anyway
        ],
    );

    let opts = DiagnoseOptions {
        truncate_at: Some(2),
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.rows_kept, 2);
    // Damage past the truncation point is still reported, as discarded.
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.problems[0].row, 4);
    assert_eq!(report.problems[0].action, RepairAction::Truncated);

    let store = Store::open_exact(&report.output.unwrap()).unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn explicit_output_path_is_honored() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(tmp.path(), &["a,one,1,0,Rust,10,2,5.0,rapid,"]);
    let out = tmp.path().join("cleaned.csv");

    let opts = DiagnoseOptions {
        fix: true,
        output: Some(out.clone()),
        ..Default::default()
    };
    let report = diagnose_file(&path, &opts).unwrap();

    assert_eq!(report.output.as_deref(), Some(out.as_path()));
    assert!(out.exists());
    assert!(!fixed_sibling(&path).exists());
}
