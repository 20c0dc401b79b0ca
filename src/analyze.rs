//! The analysis run orchestrator.
//!
//! Owns the single mutable [`Store`] for the whole run. Workers pull
//! repositories from a shared queue, analyze them in isolation, and send
//! terminal outcomes back; only this module's receive loop touches the
//! store, and it persists after every completion so an interrupted run
//! loses at most the units still in flight.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::models::{ReleaseType, RepoRecord, SonarMetrics};
use crate::progress::ProgressTracker;
use crate::scanner::{DockerSonarScanner, RepoScanner, ScanFailure};
use crate::store::{RecordFilter, Store};

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub input: PathBuf,
    pub release_type: Option<ReleaseType>,
    pub limit: Option<usize>,
    pub workers: Option<usize>,
    pub output: Option<PathBuf>,
    /// When false, already-analyzed records are re-queued and their
    /// metrics overwritten by the new run.
    pub skip_analyzed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

struct Outcome {
    record: RepoRecord,
    result: Result<SonarMetrics, ScanFailure>,
}

/// Entry point for `harvest analyze`.
pub async fn run_analyze(opts: &AnalyzeOptions, config: &Config) -> Result<()> {
    let workers = opts.workers.unwrap_or(config.analysis.workers).max(1);

    let mut store = Store::open(&opts.input)
        .with_context(|| format!("failed to open dataset {}", opts.input.display()))?;
    if let Some(output) = &opts.output {
        store.set_write_path(output.clone());
    }

    let pending = select_pending(&store, opts);
    let skipped = if opts.skip_analyzed {
        store.records().iter().filter(|r| r.analyzed).count()
    } else {
        0
    };

    eprintln!(
        "{} repositories loaded, {} already analyzed, {} queued ({} workers)",
        store.len(),
        skipped,
        pending.len(),
        workers
    );

    let scanner: Arc<dyn RepoScanner> =
        Arc::new(DockerSonarScanner::from_config(config, workers == 1)?);

    let summary = run_pool(&mut store, scanner, pending, workers, skipped).await?;

    // Parseable summary on stdout; progress already went to stderr.
    println!(
        "analyzed={} failed={} skipped={} output={}",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        store.write_path().display()
    );
    crate::stats::print_table(&store.statistics());
    Ok(())
}

/// Records to process this run: release-type filter, the skip-analyzed
/// toggle, and the limit, applied in that order over insertion order.
pub fn select_pending(store: &Store, opts: &AnalyzeOptions) -> Vec<RepoRecord> {
    store.query(&RecordFilter {
        release_type: opts.release_type,
        analyzed: if opts.skip_analyzed { Some(false) } else { None },
        limit: opts.limit,
    })
}

/// Runs the bounded worker pool over `pending` and applies every outcome
/// to `store`. Split from [`run_analyze`] so tests can drive it with a
/// scripted [`RepoScanner`].
pub async fn run_pool(
    store: &mut Store,
    scanner: Arc<dyn RepoScanner>,
    pending: Vec<RepoRecord>,
    workers: usize,
    skipped: usize,
) -> Result<RunSummary> {
    let attempted = pending.len();
    let mut progress = ProgressTracker::new(attempted);
    if attempted == 0 {
        return Ok(RunSummary {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped,
        });
    }

    let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
    let (tx, mut rx) = mpsc::channel::<Outcome>(workers);

    let mut pool = JoinSet::new();
    for worker_id in 0..workers {
        let queue = Arc::clone(&queue);
        let scanner = Arc::clone(&scanner);
        let tx = tx.clone();
        pool.spawn(async move {
            loop {
                let job = queue.lock().await.pop_front();
                let Some(record) = job else { break };
                let result = scanner.analyze(&record, worker_id).await;
                if tx.send(Outcome { record, result }).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    // Single-writer loop: upsert and persist once per completed unit.
    while let Some(outcome) = rx.recv().await {
        let mut record = outcome.record;
        let full_name = record.full_name();
        match outcome.result {
            Ok(metrics) => {
                record.mark_analyzed(metrics, Utc::now());
                progress.record(&full_name, None);
            }
            Err(failure) => {
                let reason = failure.to_string();
                record.mark_failed(&reason);
                progress.record(&full_name, Some(&reason));
            }
        }
        store.upsert(record);
        store
            .save()
            .with_context(|| format!("failed to persist {}", store.write_path().display()))?;
    }

    while pool.join_next().await.is_some() {}

    eprintln!(
        "run complete: {} ok, {} failed in {}s",
        progress.succeeded(),
        progress.failed(),
        progress.elapsed_secs()
    );

    Ok(RunSummary {
        attempted,
        succeeded: progress.succeeded(),
        failed: progress.failed(),
        skipped,
    })
}
