//! # Sonar Harvest CLI (`harvest`)
//!
//! The `harvest` binary drives repository analysis runs and the offline
//! dataset tools.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest analyze <dataset>` | Clone, scan, and persist measures incrementally |
//! | `harvest stats <dataset>` | Print dataset composition and run progress |
//! | `harvest diagnose <dataset>` | Inspect (and optionally repair) a damaged CSV |
//! | `harvest recover <dataset>` | Re-pull measures from an already-populated server |
//!
//! ## Examples
//!
//! ```bash
//! # Analyze every pending repository with four workers
//! harvest analyze repos.csv --workers 4
//!
//! # Only rapid-release repositories, at most 50
//! harvest analyze repos.csv --release-type rapid --limit 50
//!
//! # Report corruption without touching the file
//! harvest diagnose repos.csv
//!
//! # Repair what is repairable, truncate at the first broken row
//! harvest diagnose repos.csv --fix
//!
//! # Dry-run a recovery, then commit it
//! harvest recover repos_analyzed.csv
//! harvest recover repos_analyzed.csv --commit
//! ```

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use sonar_harvest::analyze::{run_analyze, AnalyzeOptions};
use sonar_harvest::config;
use sonar_harvest::diagnose::{run_diagnose, DiagnoseOptions};
use sonar_harvest::models::ReleaseType;
use sonar_harvest::recover::{run_recover, RecoverOptions};
use sonar_harvest::stats::run_stats;

/// Sonar Harvest — incremental SonarQube analysis over repository
/// datasets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file falls back to built-in defaults (local server at
/// `http://localhost:9000`, token from `SONAR_TOKEN`).
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Sonar Harvest — incremental SonarQube analysis over repository datasets",
    version,
    long_about = "Sonar Harvest clones repositories from a CSV or JSON dataset, runs the \
    containerized sonar-scanner against each one, and persists the extracted measures back \
    into the dataset after every repository, so interrupted runs resume instead of restarting."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. Server, scanner, and worker
    /// settings are read from this file; a missing file uses defaults.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Analyze pending repositories and persist measures incrementally.
    ///
    /// Loads the dataset (or its `_analyzed` sibling when one exists),
    /// skips repositories already analyzed, and processes the rest
    /// through a bounded worker pool. The dataset is saved after every
    /// completed repository.
    Analyze {
        /// Dataset file (`.csv` or `.json`).
        dataset: PathBuf,

        /// Only process repositories of this release type (`rapid` or `slow`).
        #[arg(long)]
        release_type: Option<String>,

        /// Maximum number of repositories to process this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Number of concurrent workers (overrides the config value).
        #[arg(long)]
        workers: Option<usize>,

        /// Where to write the updated dataset (defaults to the
        /// `_analyzed` sibling of the input).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip repositories already analyzed. Pass
        /// `--skip-analyzed=false` to re-queue them and overwrite their
        /// metrics.
        #[arg(
            long,
            default_value_t = true,
            action = clap::ArgAction::Set,
            num_args = 0..=1,
            default_missing_value = "true"
        )]
        skip_analyzed: bool,
    },

    /// Print dataset composition and analysis progress.
    Stats {
        /// Dataset file (`.csv` or `.json`).
        dataset: PathBuf,

        /// Emit machine-readable JSON instead of the table.
        #[arg(long)]
        json: bool,
    },

    /// Diagnose (and optionally repair) a damaged CSV dataset.
    ///
    /// Report mode never modifies the input. Repair modes write a
    /// `_fixed` sibling and leave the original untouched.
    Diagnose {
        /// Dataset file (`.csv`).
        dataset: PathBuf,

        /// Repair repairable rows and truncate at the first broken one.
        #[arg(long)]
        fix: bool,

        /// Keep only the first N data rows, unconditionally.
        #[arg(long, conflicts_with = "fix")]
        truncate_at: Option<usize>,

        /// Where to write the repaired file (defaults to the `_fixed` sibling).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Flag fields longer than this many bytes.
        #[arg(long, default_value_t = sonar_harvest::diagnose::DEFAULT_MAX_FIELD_BYTES)]
        max_field_bytes: usize,

        /// Emit the report as JSON instead of the table.
        #[arg(long)]
        json: bool,
    },

    /// Recover measures for pending repositories from the server API.
    ///
    /// No cloning or scanning: for each repository without measures,
    /// queries the SonarQube server directly. Dry run by default;
    /// `--commit` writes a `_recovered` sibling.
    Recover {
        /// Dataset file (`.csv` or `.json`).
        dataset: PathBuf,

        /// Apply recovered measures and write the `_recovered` sibling.
        #[arg(long)]
        commit: bool,

        /// Maximum number of repositories to query.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn parse_release_type(raw: &str) -> anyhow::Result<ReleaseType> {
    match raw.to_ascii_lowercase().as_str() {
        "rapid" => Ok(ReleaseType::Rapid),
        "slow" => Ok(ReleaseType::Slow),
        other => bail!("unknown release type {:?} (expected `rapid` or `slow`)", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Offline tools that never need server configuration.
    match &cli.command {
        Commands::Stats { dataset, json } => {
            return run_stats(dataset, *json);
        }
        Commands::Diagnose {
            dataset,
            fix,
            truncate_at,
            output,
            max_field_bytes,
            json,
        } => {
            let opts = DiagnoseOptions {
                fix: *fix,
                truncate_at: *truncate_at,
                output: output.clone(),
                max_field_bytes: *max_field_bytes,
            };
            return run_diagnose(dataset, &opts, *json);
        }
        _ => {}
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            dataset,
            release_type,
            limit,
            workers,
            output,
            skip_analyzed,
        } => {
            let release_type = release_type
                .as_deref()
                .map(parse_release_type)
                .transpose()?;
            let opts = AnalyzeOptions {
                input: dataset,
                release_type,
                limit,
                workers,
                output,
                skip_analyzed,
            };
            run_analyze(&opts, &cfg).await?;
        }
        Commands::Recover {
            dataset,
            commit,
            limit,
        } => {
            let opts = RecoverOptions {
                input: dataset,
                commit,
                limit,
            };
            run_recover(&opts, &cfg).await?;
        }
        Commands::Stats { .. } | Commands::Diagnose { .. } => unreachable!(),
    }

    Ok(())
}
