//! Per-repository analysis pipeline.
//!
//! One unit flows through acquire → size guard → scan → extract →
//! release. Every terminal outcome, success or failure, is returned as a
//! single value; a worker never writes to the store or to shared state,
//! which is what isolates one repository's fault from the rest of a run.
//!
//! Two seams: [`RepoScanner`] is what the orchestrator depends on, and
//! [`ScanStages`] splits the stage ordering from the process-spawning
//! stages so the ordering is testable without git or docker.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{RepoRecord, SonarMetrics};
use crate::sanitize::sanitize_project_key;
use crate::sonar_api::{MeasureSource, SonarClient};

/// Terminal per-unit failure. Stored verbatim in `failure_reason`; never
/// propagated as a process error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScanFailure {
    #[error("clone failed")]
    CloneFailed,
    #[error("clone timeout")]
    CloneTimeout,
    #[error("oversized")]
    Oversized,
    #[error("scan failed")]
    ScanFailed,
    #[error("scan timeout")]
    ScanTimeout,
    #[error("no metrics")]
    NoMetrics,
}

/// Analyzes one repository and reports the outcome as a value.
#[async_trait]
pub trait RepoScanner: Send + Sync {
    /// `worker_id` disambiguates concurrent working copies; it carries no
    /// other meaning.
    async fn analyze(
        &self,
        repo: &RepoRecord,
        worker_id: usize,
    ) -> Result<SonarMetrics, ScanFailure>;
}

/// The pipeline stages behind a unit analysis, in execution order.
#[async_trait]
pub trait ScanStages: Send + Sync {
    /// Produce a working copy of the repository at `workdir`.
    async fn acquire(&self, repo: &RepoRecord, workdir: &Path) -> Result<(), ScanFailure>;
    /// Size of the working copy in bytes.
    async fn measure(&self, workdir: &Path) -> Result<u64, ScanFailure>;
    /// Run the scanner over the working copy under `project_key`.
    async fn scan(&self, project_key: &str, workdir: &Path) -> Result<(), ScanFailure>;
    /// Pull the stored measures for `project_key`.
    async fn extract(&self, project_key: &str) -> Result<SonarMetrics, ScanFailure>;
}

/// Acquire → size guard → scan → extract. A working copy over
/// `max_bytes` stops the unit before the scan stage ever runs.
pub async fn drive_pipeline<S: ScanStages + ?Sized>(
    stages: &S,
    repo: &RepoRecord,
    workdir: &Path,
    max_bytes: u64,
) -> Result<SonarMetrics, ScanFailure> {
    stages.acquire(repo, workdir).await?;

    let size = stages.measure(workdir).await?;
    if size > max_bytes {
        return Err(ScanFailure::Oversized);
    }

    let project_key = sanitize_project_key(&repo.owner, &repo.name);
    stages.scan(&project_key, workdir).await?;
    stages.extract(&project_key).await
}

/// The production pipeline: shallow `git clone`, walkdir size guard,
/// dockerized sonar-scanner, measures extraction.
pub struct DockerSonarScanner {
    image: String,
    sonar_host: String,
    sonar_token: String,
    temp_base: PathBuf,
    clone_timeout: Duration,
    scan_timeout: Duration,
    settle: Duration,
    max_repo_bytes: u64,
    client: SonarClient,
    verbose: bool,
}

impl DockerSonarScanner {
    /// `verbose` enables per-step logging; only safe to read when the run
    /// is sequential, so the caller passes `workers == 1`.
    pub fn from_config(config: &Config, verbose: bool) -> Result<DockerSonarScanner> {
        let token = config.sonar.resolve_token()?;
        let client = SonarClient::new(
            &config.sonar.host,
            &token,
            config.sonar.request_timeout(),
        )?;

        Ok(DockerSonarScanner {
            image: config.scanner.image.clone(),
            sonar_host: config.sonar.host.clone(),
            sonar_token: token,
            temp_base: config.scanner.temp_base(),
            clone_timeout: config.scanner.clone_timeout(),
            scan_timeout: config.scanner.scan_timeout(),
            settle: config.scanner.settle(),
            max_repo_bytes: config.scanner.max_repo_bytes,
            client,
            verbose,
        })
    }

    fn log(&self, message: &str) {
        if self.verbose {
            println!("  {}", message);
        }
    }
}

#[async_trait]
impl ScanStages for DockerSonarScanner {
    async fn acquire(&self, repo: &RepoRecord, workdir: &Path) -> Result<(), ScanFailure> {
        let url = format!("https://github.com/{}/{}.git", repo.owner, repo.name);
        self.log(&format!("cloning {}", url));

        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1", &url])
            .arg(workdir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.clone_timeout, cmd.output()).await {
            Err(_) => Err(ScanFailure::CloneTimeout),
            Ok(Err(_)) => Err(ScanFailure::CloneFailed), // git not installed
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(_)) => Err(ScanFailure::CloneFailed),
        }
    }

    async fn measure(&self, workdir: &Path) -> Result<u64, ScanFailure> {
        let dir = workdir.to_path_buf();
        tokio::task::spawn_blocking(move || directory_size(&dir))
            .await
            .map_err(|_| ScanFailure::CloneFailed)
    }

    async fn scan(&self, project_key: &str, workdir: &Path) -> Result<(), ScanFailure> {
        self.log("running sonar-scanner");

        let workdir = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());
        let volume = format!("{}:/usr/src", workdir.display());

        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "--network", "host"])
            .args(["-e", &format!("SONAR_HOST_URL={}", self.sonar_host)])
            .args(["-e", &format!("SONAR_TOKEN={}", self.sonar_token)])
            .args(["-v", &volume])
            .arg(&self.image)
            .arg(format!("-Dsonar.projectKey={}", project_key))
            .arg(format!("-Dsonar.projectName={}", project_key))
            .arg("-Dsonar.sources=.")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(self.scan_timeout, cmd.output()).await {
            Err(_) => Err(ScanFailure::ScanTimeout),
            Ok(Err(_)) => Err(ScanFailure::ScanFailed), // docker not installed
            Ok(Ok(output)) if output.status.success() => {
                // Give the server time to process the submitted report
                // before the measures query.
                tokio::time::sleep(self.settle).await;
                Ok(())
            }
            Ok(Ok(_)) => Err(ScanFailure::ScanFailed),
        }
    }

    async fn extract(&self, project_key: &str) -> Result<SonarMetrics, ScanFailure> {
        self.log("extracting measures");
        match self.client.fetch_measures(project_key).await {
            Ok(Some(metrics)) => Ok(metrics),
            Ok(None) => Err(ScanFailure::NoMetrics),
            Err(e) => {
                eprintln!("measures query failed for {}: {:#}", project_key, e);
                Err(ScanFailure::NoMetrics)
            }
        }
    }
}

#[async_trait]
impl RepoScanner for DockerSonarScanner {
    async fn analyze(
        &self,
        repo: &RepoRecord,
        worker_id: usize,
    ) -> Result<SonarMetrics, ScanFailure> {
        let project_key = sanitize_project_key(&repo.owner, &repo.name);
        let workdir = self.temp_base.join(format!("{}_{}", project_key, worker_id));

        // Stale copy from an interrupted run.
        if workdir.exists() {
            release_workdir(&workdir);
        }
        if std::fs::create_dir_all(&self.temp_base).is_err() {
            return Err(ScanFailure::CloneFailed);
        }

        let result = drive_pipeline(self, repo, &workdir, self.max_repo_bytes).await;
        if let (Err(failure), true) = (&result, self.verbose) {
            println!("  {} {}", repo.full_name(), failure);
        }
        release_workdir(&workdir);
        result
    }
}

/// Total size in bytes of regular files under `path`, symlinks skipped.
/// Computed post-clone because the size is not knowable beforehand.
pub fn directory_size(path: &Path) -> u64 {
    let mut total = 0u64;
    for entry in WalkDir::new(path).into_iter().flatten() {
        if entry.file_type().is_file() && !entry.path_is_symlink() {
            if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

/// Best-effort release of a working copy. A failed delete is logged and
/// never blocks returning the unit's result.
pub fn release_workdir(workdir: &Path) {
    if !workdir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(workdir) {
        eprintln!(
            "warning: failed to remove working copy {}: {}",
            workdir.display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    /// Stages that record the order they were entered in; `measure`
    /// reports a fixed size.
    struct RecordingStages {
        size: u64,
        entered: Mutex<Vec<&'static str>>,
        keys: Mutex<Vec<String>>,
    }

    impl RecordingStages {
        fn new(size: u64) -> Self {
            RecordingStages {
                size,
                entered: Mutex::new(Vec::new()),
                keys: Mutex::new(Vec::new()),
            }
        }

        fn entered(&self) -> Vec<&'static str> {
            self.entered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScanStages for RecordingStages {
        async fn acquire(&self, _repo: &RepoRecord, _workdir: &Path) -> Result<(), ScanFailure> {
            self.entered.lock().unwrap().push("acquire");
            Ok(())
        }

        async fn measure(&self, _workdir: &Path) -> Result<u64, ScanFailure> {
            self.entered.lock().unwrap().push("measure");
            Ok(self.size)
        }

        async fn scan(&self, project_key: &str, _workdir: &Path) -> Result<(), ScanFailure> {
            self.entered.lock().unwrap().push("scan");
            self.keys.lock().unwrap().push(project_key.to_string());
            Ok(())
        }

        async fn extract(&self, project_key: &str) -> Result<SonarMetrics, ScanFailure> {
            self.entered.lock().unwrap().push("extract");
            self.keys.lock().unwrap().push(project_key.to_string());
            Ok(SonarMetrics::default())
        }
    }

    #[test]
    fn directory_size_sums_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), vec![0u8; 100]).unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b.txt"), vec![0u8; 50]).unwrap();
        assert_eq!(directory_size(tmp.path()), 150);
    }

    #[tokio::test]
    async fn oversized_working_copy_never_reaches_the_scan_stage() {
        let stages = RecordingStages::new(4096);
        let repo = RepoRecord::new("alice", "webapp");

        let result = drive_pipeline(&stages, &repo, Path::new("unused"), 1024).await;

        assert_eq!(result, Err(ScanFailure::Oversized));
        assert_eq!(stages.entered(), vec!["acquire", "measure"]);
    }

    #[tokio::test]
    async fn stages_run_in_order_with_the_sanitized_key() {
        let stages = RecordingStages::new(100);
        let repo = RepoRecord::new("user/org", "repo");

        let result = drive_pipeline(&stages, &repo, Path::new("unused"), 1024).await;

        assert!(result.is_ok());
        assert_eq!(stages.entered(), vec!["acquire", "measure", "scan", "extract"]);
        assert_eq!(
            stages.keys.lock().unwrap().as_slice(),
            &["user-org_repo".to_string(), "user-org_repo".to_string()]
        );
    }

    #[test]
    fn release_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("copy");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f"), "x").unwrap();

        release_workdir(&dir);
        assert!(!dir.exists());
        release_workdir(&dir); // second call is a no-op
    }

    #[test]
    fn failure_reasons_render_as_stored_strings() {
        assert_eq!(ScanFailure::Oversized.to_string(), "oversized");
        assert_eq!(ScanFailure::CloneTimeout.to_string(), "clone timeout");
        assert_eq!(ScanFailure::NoMetrics.to_string(), "no metrics");
    }
}
