//! # Sonar Harvest
//!
//! Incremental dataset persistence and parallel repository analysis,
//! built around a local SonarQube server.
//!
//! Sonar Harvest takes a dataset of GitHub repositories (CSV or JSON),
//! clones each one, runs the containerized sonar-scanner against it, and
//! folds the extracted quality measures back into the dataset — saving
//! after every repository so an interrupted run resumes where it left
//! off instead of starting over.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌───────────────┐
//! │ dataset  │──▶│ worker pool               │──▶│ store          │
//! │ CSV/JSON │   │ clone → guard → scan →    │   │ upsert + save  │
//! └──────────┘   │ extract (per repository)  │   │ per completion │
//!                └───────────────────────────┘   └───────────────┘
//! ```
//!
//! Workers never touch the store; they return terminal outcomes and the
//! orchestrator applies them one at a time.
//!
//! ## Quick Start
//!
//! ```bash
//! harvest analyze repos.csv --workers 4     # writes repos_analyzed.csv
//! harvest stats repos.csv                   # progress counters
//! harvest diagnose repos.csv                # inspect a damaged file
//! harvest diagnose repos.csv --fix          # write repos_fixed.csv
//! harvest recover repos.csv --commit        # re-pull measures from the server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Incremental persistence over pluggable formats |
//! | [`store_csv`] | Flat CSV format |
//! | [`store_json`] | Structured JSON format |
//! | [`sanitize`] | Project key derivation |
//! | [`scanner`] | Clone / size-guard / scan pipeline |
//! | [`analyze`] | Worker pool orchestration |
//! | [`diagnose`] | Corruption diagnosis and repair |
//! | [`recover`] | Measure recovery from the server API |
//! | [`sonar_api`] | SonarQube web API client |
//! | [`stats`] | Dataset statistics |

pub mod analyze;
pub mod config;
pub mod diagnose;
pub mod models;
pub mod progress;
pub mod recover;
pub mod sanitize;
pub mod scanner;
pub mod sonar_api;
pub mod stats;
pub mod store;
pub mod store_csv;
pub mod store_json;
