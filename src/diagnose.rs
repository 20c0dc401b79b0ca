//! Offline CSV corruption diagnostic and repair.
//!
//! Normal loads refuse structurally damaged files (see
//! [`crate::store::StoreError::Format`]); this module is the explicit
//! repair path. It reports every row whose field count disagrees with the
//! header, whose identity columns are misaligned, or whose fields are
//! suspiciously large (binary or multi-line text written unescaped into a
//! field — the dominant observed failure mode, produced by unsynchronized
//! concurrent writers).
//!
//! Repair never guesses: a row is realigned only when exactly one
//! unambiguous correction exists, otherwise the file is truncated at the
//! first unrepairable row. The corrected output is always a new file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;

use crate::store::fixed_sibling;

/// Fields larger than this many bytes are flagged as runaway data.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 2_000;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProblemKind {
    /// Row has more or fewer fields than the header.
    FieldCount { expected: usize, found: usize },
    /// A single field exceeds the maximum byte length.
    OversizedField { column: usize, bytes: usize },
    /// Field count matches but the identity columns are shifted
    /// (empty owner with an `owner/name` composite in the name column).
    MisalignedIdentity,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// Report-only mode, or a problem upstream of the output cut.
    Reported,
    /// Unambiguously corrected in the output file.
    Realigned,
    /// Unrepairable; the output is truncated at this row.
    Dropped,
    /// Discarded because it sits at or past a truncation point.
    Truncated,
}

/// One diagnostic finding: 1-based file row (header = row 1), what was
/// wrong, and what the tool did about it.
#[derive(Debug, Clone, Serialize)]
pub struct RowProblem {
    pub row: usize,
    #[serde(flatten)]
    pub kind: ProblemKind,
    pub action: RepairAction,
}

#[derive(Debug, Serialize)]
pub struct DiagnosisReport {
    pub data_rows: usize,
    pub rows_kept: usize,
    pub problems: Vec<RowProblem>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnoseOptions {
    /// Attempt unambiguous realignment; fall back to truncation.
    pub fix: bool,
    /// Keep only the first N data rows, unconditionally.
    pub truncate_at: Option<usize>,
    /// Output path for repair modes. Defaults to the `_fixed` sibling.
    pub output: Option<PathBuf>,
    /// Overrides [`DEFAULT_MAX_FIELD_BYTES`] when non-zero.
    pub max_field_bytes: usize,
}

enum RowState {
    Clean,
    /// Problem plus the realigned record, when one unambiguous fix exists.
    Repairable(ProblemKind, StringRecord),
    Broken(ProblemKind),
}

/// Diagnose `path` and, in a repair mode, write the corrected file.
/// A damaged input is a finding, not an error: this only fails when the
/// file cannot be read at all or the output cannot be written.
pub fn diagnose_file(path: &Path, opts: &DiagnoseOptions) -> Result<DiagnosisReport> {
    let max_field_bytes = if opts.max_field_bytes == 0 {
        DEFAULT_MAX_FIELD_BYTES
    } else {
        opts.max_field_bytes
    };

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows: Vec<StringRecord> = Vec::new();
    for record in reader.records() {
        rows.push(record.with_context(|| format!("failed to read {}", path.display()))?);
    }
    if rows.is_empty() {
        bail!("{} is empty (no header row)", path.display());
    }

    let header = rows.remove(0);
    let expected = header.len();
    let owner_col = header.iter().position(|c| c.trim() == "owner");
    let name_col = header.iter().position(|c| c.trim() == "name");

    let mut problems: Vec<RowProblem> = Vec::new();
    let mut kept: Vec<StringRecord> = Vec::new();
    // Index of the first discarded data row once truncation kicks in.
    let mut cut: Option<usize> = None;

    for (i, record) in rows.iter().enumerate() {
        let row = i + 2;

        if let Some(limit) = opts.truncate_at {
            if i >= limit {
                if let RowState::Broken(kind) | RowState::Repairable(kind, _) =
                    classify(record, expected, owner_col, name_col, max_field_bytes)
                {
                    problems.push(RowProblem {
                        row,
                        kind,
                        action: RepairAction::Truncated,
                    });
                }
                cut.get_or_insert(i);
                continue;
            }
        }

        if cut.is_some() {
            // Past the fix-mode truncation point: record remaining damage
            // for the report, discard the row.
            if let RowState::Broken(kind) | RowState::Repairable(kind, _) =
                classify(record, expected, owner_col, name_col, max_field_bytes)
            {
                problems.push(RowProblem {
                    row,
                    kind,
                    action: RepairAction::Truncated,
                });
            }
            continue;
        }

        match classify(record, expected, owner_col, name_col, max_field_bytes) {
            RowState::Clean => kept.push(record.clone()),
            RowState::Repairable(kind, fixed) => {
                if opts.fix {
                    problems.push(RowProblem {
                        row,
                        kind,
                        action: RepairAction::Realigned,
                    });
                    kept.push(fixed);
                } else {
                    problems.push(RowProblem {
                        row,
                        kind,
                        action: RepairAction::Reported,
                    });
                    kept.push(record.clone());
                }
            }
            RowState::Broken(kind) => {
                if opts.fix {
                    problems.push(RowProblem {
                        row,
                        kind,
                        action: RepairAction::Dropped,
                    });
                    cut = Some(i);
                } else {
                    problems.push(RowProblem {
                        row,
                        kind,
                        action: RepairAction::Reported,
                    });
                    kept.push(record.clone());
                }
            }
        }
    }

    let repairing = opts.fix || opts.truncate_at.is_some();
    let output = if repairing {
        let out_path = opts
            .output
            .clone()
            .unwrap_or_else(|| fixed_sibling(path));
        write_rows(&out_path, &header, &kept)?;
        Some(out_path)
    } else {
        None
    };

    Ok(DiagnosisReport {
        data_rows: rows.len(),
        rows_kept: kept.len(),
        problems,
        output,
    })
}

fn classify(
    record: &StringRecord,
    expected: usize,
    owner_col: Option<usize>,
    name_col: Option<usize>,
    max_field_bytes: usize,
) -> RowState {
    let found = record.len();

    if found != expected {
        // One extra field with an empty leading column: the writer shifted
        // everything right by one. Dropping the empty field is the single
        // unambiguous correction.
        if found == expected + 1 && record.get(0).is_some_and(|f| f.trim().is_empty()) {
            let fixed: StringRecord = record.iter().skip(1).collect();
            return RowState::Repairable(ProblemKind::FieldCount { expected, found }, fixed);
        }
        // One missing field with an `owner/name` composite in the first
        // column: one delimiter was lost; splitting at the first slash
        // restores the pair.
        if found + 1 == expected {
            if let Some(first) = record.get(0) {
                if let Some((owner, name)) = first.split_once('/') {
                    if !owner.is_empty() && !name.is_empty() {
                        let mut fixed = StringRecord::new();
                        fixed.push_field(owner);
                        fixed.push_field(name);
                        for field in record.iter().skip(1) {
                            fixed.push_field(field);
                        }
                        return RowState::Repairable(
                            ProblemKind::FieldCount { expected, found },
                            fixed,
                        );
                    }
                }
            }
        }
        return RowState::Broken(ProblemKind::FieldCount { expected, found });
    }

    if let Some(kind) = oversized(record, max_field_bytes) {
        return RowState::Broken(kind);
    }

    // Correct width but empty owner with a composite in the name column.
    if let (Some(oc), Some(nc)) = (owner_col, name_col) {
        let owner_empty = record.get(oc).is_some_and(|f| f.trim().is_empty());
        let composite = record.get(nc).and_then(|f| f.split_once('/'));
        if owner_empty {
            if let Some((owner, name)) = composite {
                if !owner.is_empty() && !name.is_empty() {
                    let fixed: StringRecord = record
                        .iter()
                        .enumerate()
                        .map(|(i, field)| {
                            if i == oc {
                                owner
                            } else if i == nc {
                                name
                            } else {
                                field
                            }
                        })
                        .collect();
                    return RowState::Repairable(ProblemKind::MisalignedIdentity, fixed);
                }
            }
            return RowState::Broken(ProblemKind::MisalignedIdentity);
        }
    }

    RowState::Clean
}

fn oversized(record: &StringRecord, max_field_bytes: usize) -> Option<ProblemKind> {
    record
        .iter()
        .enumerate()
        .find(|(_, field)| field.len() > max_field_bytes)
        .map(|(i, field)| ProblemKind::OversizedField {
            column: i + 1,
            bytes: field.len(),
        })
}

fn write_rows(path: &Path, header: &StringRecord, rows: &[StringRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// CLI entry: run the diagnostic and print a human or JSON report.
pub fn run_diagnose(path: &Path, opts: &DiagnoseOptions, json: bool) -> Result<()> {
    let report = diagnose_file(path, opts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("diagnose {}", path.display());
    println!("  data rows: {}", report.data_rows);
    println!("  rows kept: {}", report.rows_kept);
    println!("  problems:  {}", report.problems.len());
    for problem in &report.problems {
        let desc = match &problem.kind {
            ProblemKind::FieldCount { expected, found } => {
                format!("field count {} (header has {})", found, expected)
            }
            ProblemKind::OversizedField { column, bytes } => {
                format!("oversized field in column {} ({} bytes)", column, bytes)
            }
            ProblemKind::MisalignedIdentity => "misaligned owner/name columns".to_string(),
        };
        println!("    row {:>5}  {:<44} {:?}", problem.row, desc, problem.action);
    }
    if let Some(output) = &report.output {
        println!("  corrected file: {}", output.display());
    } else if !report.problems.is_empty() {
        println!("  (report only — rerun with --fix or --truncate-at to repair)");
    }
    println!("ok");
    Ok(())
}
