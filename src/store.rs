//! Record store: persistence abstraction over the dataset file.
//!
//! Two on-disk formats implement [`StoreFormat`]: row-oriented CSV
//! ([`crate::store_csv`]) and document-oriented JSON
//! ([`crate::store_json`]), selected by file extension. [`Store`] owns the
//! in-memory [`Dataset`] while it is loaded; callers mutate records only
//! through its methods, never behind its back.
//!
//! ## Resume convention
//!
//! For a logical input `X.csv`, incremental output is written to
//! `X_analyzed.csv`. If that sibling exists, it is the current state and
//! `X.csv` is read-only seed data. A crash after N completed units
//! therefore never loses units 1..N.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::{Dataset, ReleaseType, RepoRecord};
use crate::store_csv::CsvFormat;
use crate::store_json::JsonFormat;

/// Errors tied to the shared store file. All of these are fatal to the
/// run: a damaged shared store risks corrupting every subsequent write.
/// Per-unit failures are *values* (see [`crate::scanner`]), never
/// `StoreError`s.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Structural row corruption. Surfaced with the 1-based file row
    /// (header = row 1) and never auto-repaired during a normal load;
    /// `harvest diagnose` is the explicit repair tool.
    #[error("malformed row {row}: {detail} (run `harvest diagnose` to inspect)")]
    Format { row: usize, detail: String },

    #[error("cannot parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("unsupported store extension for {path} (expected .csv or .json)")]
    UnsupportedExtension { path: PathBuf },
}

/// A dataset serialization format. Implementations read and write whole
/// files; [`Store`] layers resume paths and atomic replacement on top.
pub trait StoreFormat: Send + Sync {
    fn read(&self, path: &Path) -> Result<Dataset, StoreError>;
    fn write(&self, path: &Path, dataset: &Dataset) -> Result<(), StoreError>;
}

/// Filter for [`Store::query`]. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilter {
    pub release_type: Option<ReleaseType>,
    pub analyzed: Option<bool>,
    pub limit: Option<usize>,
}

/// Summary counters over a loaded dataset.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub rapid: usize,
    pub slow: usize,
    pub unclassified: usize,
    pub analyzed: usize,
    pub pending: usize,
    pub rapid_avg_interval: Option<f64>,
    pub rapid_avg_contributors: Option<f64>,
    pub slow_avg_interval: Option<f64>,
    pub slow_avg_contributors: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// The record store: one loaded dataset plus its write target.
pub struct Store {
    format: Box<dyn StoreFormat>,
    write_path: PathBuf,
    dataset: Dataset,
}

// Hand-written: the format box has no Debug.
impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("write_path", &self.write_path)
            .field("records", &self.dataset.repositories.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open a store resume-aware: if the `_analyzed` sibling of `path`
    /// exists it supersedes the original, otherwise the original is the
    /// seed. Writes always go to the sibling.
    pub fn open(path: &Path) -> Result<Store, StoreError> {
        let format = format_for(path)?;
        let sibling = analyzed_sibling(path);
        let read_path: &Path = if sibling.exists() { &sibling } else { path };
        let dataset = format.read(read_path)?;
        Ok(Store {
            format,
            write_path: sibling,
            dataset,
        })
    }

    /// Open exactly `path`, reading and writing that file. Used by the
    /// offline tools that pick their own output sibling.
    pub fn open_exact(path: &Path) -> Result<Store, StoreError> {
        let format = format_for(path)?;
        let dataset = format.read(path)?;
        Ok(Store {
            format,
            write_path: path.to_path_buf(),
            dataset,
        })
    }

    pub fn write_path(&self) -> &Path {
        &self.write_path
    }

    pub fn set_write_path(&mut self, path: PathBuf) {
        self.write_path = path;
    }

    pub fn records(&self) -> &[RepoRecord] {
        &self.dataset.repositories
    }

    pub fn len(&self) -> usize {
        self.dataset.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.repositories.is_empty()
    }

    pub fn find(&self, owner: &str, name: &str) -> Option<&RepoRecord> {
        self.dataset
            .repositories
            .iter()
            .find(|r| r.matches(owner, name))
    }

    /// Replace the record matching (`owner`, `name`), or append if absent.
    /// Matching is by identity pair, never by row position. The O(n) scan
    /// is fine at the dataset sizes this tool targets.
    pub fn upsert(&mut self, record: RepoRecord) {
        match self
            .dataset
            .repositories
            .iter_mut()
            .find(|r| r.matches(&record.owner, &record.name))
        {
            Some(existing) => *existing = record,
            None => self.dataset.repositories.push(record),
        }
    }

    /// Write the full dataset to the write target, atomically: serialize
    /// to a temporary sibling, then rename over the destination, so a
    /// crash mid-write never leaves a half-written file visible.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.dataset.last_updated_at = Utc::now();

        let tmp = tmp_path(&self.write_path);
        self.format.write(&tmp, &self.dataset)?;
        fs::rename(&tmp, &self.write_path).map_err(|source| StoreError::Io {
            path: self.write_path.clone(),
            source,
        })
    }

    /// Records matching `filter`, in insertion order. A limit truncates,
    /// it does not sample.
    pub fn query(&self, filter: &RecordFilter) -> Vec<RepoRecord> {
        let iter = self.dataset.repositories.iter().filter(|r| {
            filter
                .release_type
                .map_or(true, |t| r.release_type == t)
                && filter.analyzed.map_or(true, |a| r.analyzed == a)
        });
        match filter.limit {
            Some(limit) => iter.take(limit).cloned().collect(),
            None => iter.cloned().collect(),
        }
    }

    pub fn statistics(&self) -> StoreStats {
        let repos = &self.dataset.repositories;
        let rapid: Vec<&RepoRecord> = repos
            .iter()
            .filter(|r| r.release_type == ReleaseType::Rapid)
            .collect();
        let slow: Vec<&RepoRecord> = repos
            .iter()
            .filter(|r| r.release_type == ReleaseType::Slow)
            .collect();
        let analyzed = repos.iter().filter(|r| r.analyzed).count();

        StoreStats {
            total: repos.len(),
            rapid: rapid.len(),
            slow: slow.len(),
            unclassified: repos.len() - rapid.len() - slow.len(),
            analyzed,
            pending: repos.len() - analyzed,
            rapid_avg_interval: avg(&rapid, |r| r.median_release_interval),
            rapid_avg_contributors: avg(&rapid, |r| r.contributors as f64),
            slow_avg_interval: avg(&slow, |r| r.median_release_interval),
            slow_avg_contributors: avg(&slow, |r| r.contributors as f64),
            created_at: self.dataset.created_at,
            last_updated_at: self.dataset.last_updated_at,
        }
    }
}

fn avg(records: &[&RepoRecord], f: impl Fn(&RepoRecord) -> f64) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    Some(records.iter().map(|r| f(r)).sum::<f64>() / records.len() as f64)
}

fn format_for(path: &Path) -> Result<Box<dyn StoreFormat>, StoreError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Ok(Box::new(CsvFormat)),
        Some("json") => Ok(Box::new(JsonFormat)),
        _ => Err(StoreError::UnsupportedExtension {
            path: path.to_path_buf(),
        }),
    }
}

/// The `_analyzed` sibling of a store path: `repos.csv` →
/// `repos_analyzed.csv`. A path already carrying the suffix is returned
/// unchanged, so re-opening an incremental file keeps writing to itself.
pub fn analyzed_sibling(path: &Path) -> PathBuf {
    with_stem_suffix(path, "_analyzed")
}

/// The `_recovered` sibling, used by `harvest recover` commit mode.
pub fn recovered_sibling(path: &Path) -> PathBuf {
    with_stem_suffix(path, "_recovered")
}

/// The `_fixed` sibling, used by `harvest diagnose` repair modes.
pub fn fixed_sibling(path: &Path) -> PathBuf {
    with_stem_suffix(path, "_fixed")
}

fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if stem.ends_with(suffix) {
        return path.to_path_buf();
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let file_name = if ext.is_empty() {
        format!("{}{}", stem, suffix)
    } else {
        format!("{}{}.{}", stem, suffix, ext)
    };
    path.with_file_name(file_name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    path.with_file_name(format!("{}.tmp", file_name))
}
