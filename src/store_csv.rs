//! Row-oriented (CSV) dataset format.
//!
//! The canonical header is the ten collection-phase columns plus the
//! metric extension columns added once analysis results exist. Every data
//! row must carry exactly the header's field count; a mismatch is
//! corruption and fails the load with the 1-based row number rather than
//! silently shifting columns — the repair path is `harvest diagnose`.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::models::{Dataset, ReleaseType, RepoRecord, SonarMetrics};
use crate::store::{StoreError, StoreFormat};

/// Collection-phase columns, in canonical order.
pub const BASE_COLUMNS: [&str; 10] = [
    "owner",
    "name",
    "stars",
    "forks",
    "language",
    "release_count",
    "contributors",
    "median_release_interval",
    "release_type",
    "reason",
];

/// Analysis extension columns: the thirteen metrics plus the completion
/// flag and timestamp.
pub fn extension_columns() -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = SonarMetrics::KEYS.to_vec();
    cols.push("sonarqube_analyzed");
    cols.push("sonarqube_analyzed_at");
    cols
}

pub struct CsvFormat;

impl StoreFormat for CsvFormat {
    fn read(&self, path: &Path) -> Result<Dataset, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // flexible: keep short/long rows intact so we can report the
        // exact field count instead of getting a reader-level error.
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

        let header = reader
            .headers()
            .map_err(|e| csv_error(path, e))?
            .clone();
        let columns = ColumnMap::from_header(path, &header)?;

        let mut dataset = Dataset::new();
        for (idx, result) in reader.records().enumerate() {
            let row = idx + 2; // 1-based file row, header is row 1
            let record = result.map_err(|e| csv_error(path, e))?;
            if record.len() != header.len() {
                return Err(StoreError::Format {
                    row,
                    detail: format!(
                        "expected {} fields, found {}",
                        header.len(),
                        record.len()
                    ),
                });
            }
            dataset
                .repositories
                .push(columns.parse_record(&record, row)?);
        }

        Ok(dataset)
    }

    fn write(&self, path: &Path, dataset: &Dataset) -> Result<(), StoreError> {
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .map_err(|e| csv_error(path, e))?;

        let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
        header.extend(extension_columns());
        writer
            .write_record(&header)
            .map_err(|e| csv_error(path, e))?;

        for repo in &dataset.repositories {
            writer
                .write_record(record_fields(repo))
                .map_err(|e| csv_error(path, e))?;
        }

        writer.flush().map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Column-name to index mapping built from the actual file header. The
/// base columns are mandatory; extension columns are optional so that a
/// freshly collected (pre-analysis) file loads with everything pending.
struct ColumnMap {
    indices: Vec<(String, usize)>,
}

impl ColumnMap {
    fn from_header(path: &Path, header: &StringRecord) -> Result<ColumnMap, StoreError> {
        let indices: Vec<(String, usize)> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        for required in BASE_COLUMNS {
            if !indices.iter().any(|(name, _)| name == required) {
                return Err(StoreError::Parse {
                    path: path.to_path_buf(),
                    detail: format!("missing required column '{}'", required),
                });
            }
        }

        Ok(ColumnMap { indices })
    }

    fn field<'a>(&self, record: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.indices
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, i)| record.get(*i))
    }

    fn parse_record(&self, record: &StringRecord, row: usize) -> Result<RepoRecord, StoreError> {
        let field = |column: &str| self.field(record, column).unwrap_or("").trim().to_string();

        let mut repo = RepoRecord::new(field("owner"), field("name"));
        repo.stars = parse_u64(&field("stars"), row, "stars")?;
        repo.forks = parse_u64(&field("forks"), row, "forks")?;
        repo.language = non_empty(field("language"));
        repo.release_count = parse_u64(&field("release_count"), row, "release_count")?;
        repo.contributors = parse_u64(&field("contributors"), row, "contributors")?;
        repo.median_release_interval = parse_f64(
            &field("median_release_interval"),
            row,
            "median_release_interval",
        )?;
        repo.release_type = ReleaseType::parse(&field("release_type"));
        repo.failure_reason = non_empty(field("reason"));

        let mut metrics = SonarMetrics::default();
        for key in SonarMetrics::KEYS {
            if let Some(value) = self.field(record, key) {
                metrics.set(key, value);
            }
        }
        repo.metrics = if metrics.is_empty() { None } else { Some(metrics) };

        let analyzed_field = field("sonarqube_analyzed");
        let flagged =
            analyzed_field.eq_ignore_ascii_case("true") || analyzed_field == "1";
        // analyzed implies metrics: a flag that survived a write which
        // lost the measure columns loads as pending instead.
        repo.analyzed = flagged && repo.metrics.is_some();
        repo.analyzed_at = if repo.analyzed {
            parse_timestamp(&field("sonarqube_analyzed_at"))
        } else {
            None
        };

        Ok(repo)
    }
}

fn record_fields(repo: &RepoRecord) -> Vec<String> {
    let mut fields = vec![
        repo.owner.clone(),
        repo.name.clone(),
        repo.stars.to_string(),
        repo.forks.to_string(),
        repo.language.clone().unwrap_or_default(),
        repo.release_count.to_string(),
        repo.contributors.to_string(),
        format_f64(repo.median_release_interval),
        repo.release_type.as_str().to_string(),
        repo.failure_reason.clone().unwrap_or_default(),
    ];

    let metrics = repo.metrics.clone().unwrap_or_default();
    for key in SonarMetrics::KEYS {
        fields.push(metrics.get(key).unwrap_or_default());
    }
    fields.push(if repo.analyzed { "true".to_string() } else { String::new() });
    fields.push(
        repo.analyzed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    );

    fields
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_u64(field: &str, row: usize, column: &str) -> Result<u64, StoreError> {
    if field.is_empty() {
        return Ok(0);
    }
    field.parse().map_err(|_| StoreError::Format {
        row,
        detail: format!("column '{}' is not a count: {:?}", column, field),
    })
}

fn parse_f64(field: &str, row: usize, column: &str) -> Result<f64, StoreError> {
    if field.is_empty() {
        return Ok(0.0);
    }
    field.parse().map_err(|_| StoreError::Format {
        row,
        detail: format!("column '{}' is not a number: {:?}", column, field),
    })
}

/// Accept RFC 3339 as written by this tool, plus the bare ISO form the
/// historical Python files used.
fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    if field.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(field) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(field, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

fn format_f64(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn csv_error(path: &Path, e: csv::Error) -> StoreError {
    match e.into_kind() {
        csv::ErrorKind::Io(source) => StoreError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => StoreError::Parse {
            path: path.to_path_buf(),
            detail: format!("{:?}", other),
        },
    }
}
