//! Metric recovery from an already-populated SonarQube server.
//!
//! When a run's persisted output was lost or mangled but the scans
//! themselves completed, the server still holds the measures. Recovery
//! replays the extraction step only: no cloning, no scanning, just the
//! measures query per pending repository.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::config::Config;
use crate::sanitize::sanitize_project_key;
use crate::sonar_api::{MeasureSource, SonarClient};
use crate::store::{recovered_sibling, Store};

#[derive(Debug, Clone)]
pub struct RecoverOptions {
    pub input: PathBuf,
    pub commit: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverSummary {
    /// Records queried against the server.
    pub examined: usize,
    pub recovered: usize,
    /// Queried, but no project exists server-side.
    pub missing: usize,
    /// Skipped without a query: the record already carries metrics.
    pub already_had: usize,
}

/// Entry point for `harvest recover`.
pub async fn run_recover(opts: &RecoverOptions, config: &Config) -> Result<()> {
    let token = config.sonar.resolve_token()?;
    let client = SonarClient::new(&config.sonar.host, &token, config.sonar.request_timeout())?;

    let status = client
        .system_status()
        .await
        .with_context(|| format!("SonarQube at {} is not reachable", config.sonar.host))?;
    if status != "UP" {
        bail!("SonarQube at {} reports status {}", config.sonar.host, status);
    }

    let mut store = Store::open_exact(&opts.input)
        .with_context(|| format!("failed to open dataset {}", opts.input.display()))?;
    store.set_write_path(recovered_sibling(&opts.input));

    let summary = recover_pending(&mut store, &client, opts.commit, opts.limit).await?;

    if opts.commit {
        println!(
            "recovered={} missing={} already_had_metrics={} output={}",
            summary.recovered,
            summary.missing,
            summary.already_had,
            store.write_path().display()
        );
    } else {
        println!(
            "recovered={} missing={} already_had_metrics={} (dry run, nothing written)",
            summary.recovered, summary.missing, summary.already_had
        );
    }
    Ok(())
}

/// Queries the measure source for every record still missing metrics —
/// pending records, and records whose analyzed flag survived a write that
/// lost the measures themselves. Records that already carry metrics are
/// counted and skipped. In dry-run mode the store is left untouched; in
/// commit mode each hit is applied and the store is saved once at the end.
pub async fn recover_pending(
    store: &mut Store,
    source: &dyn MeasureSource,
    commit: bool,
    limit: Option<usize>,
) -> Result<RecoverSummary> {
    let already_had = store
        .records()
        .iter()
        .filter(|r| r.analyzed && r.metrics.is_some())
        .count();
    let targets: Vec<(String, String)> = store
        .records()
        .iter()
        .filter(|r| !r.analyzed || r.metrics.is_none())
        .take(limit.unwrap_or(usize::MAX))
        .map(|r| (r.owner.clone(), r.name.clone()))
        .collect();

    let mut summary = RecoverSummary {
        examined: targets.len(),
        recovered: 0,
        missing: 0,
        already_had,
    };

    for (owner, name) in targets {
        let key = sanitize_project_key(&owner, &name);
        match source.fetch_measures(&key).await? {
            Some(metrics) => {
                summary.recovered += 1;
                eprintln!("recovered {}/{}", owner, name);
                if commit {
                    if let Some(existing) = store.find(&owner, &name) {
                        let mut record = existing.clone();
                        record.mark_analyzed(metrics, Utc::now());
                        store.upsert(record);
                    }
                }
            }
            None => {
                summary.missing += 1;
                eprintln!("no project on server for {}/{}", owner, name);
            }
        }
    }

    if commit && summary.recovered > 0 {
        store
            .save()
            .with_context(|| format!("failed to persist {}", store.write_path().display()))?;
    }
    Ok(summary)
}
