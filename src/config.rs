use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sonar: SonarConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SonarConfig {
    /// SonarQube server base URL.
    #[serde(default = "default_host")]
    pub host: String,
    /// Inline token. Prefer `token_env`; this exists for throwaway setups.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable the token is read from.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SonarConfig {
    fn default() -> Self {
        SonarConfig {
            host: default_host(),
            token: None,
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "http://localhost:9000".to_string()
}
fn default_token_env() -> String {
    "SONAR_TOKEN".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl SonarConfig {
    /// Inline token if set, otherwise the configured environment variable.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            if !token.is_empty() {
                return Ok(token.clone());
            }
        }
        match std::env::var(&self.token_env) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => bail!(
                "SonarQube token not configured: set {} or [sonar].token",
                self.token_env
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Scanner container image.
    #[serde(default = "default_image")]
    pub image: String,
    /// Base directory for working copies. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Wait after a successful scan for server-side processing to land
    /// before querying measures.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Working copies larger than this are abandoned without scanning.
    #[serde(default = "default_max_repo_bytes")]
    pub max_repo_bytes: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            image: default_image(),
            temp_dir: None,
            clone_timeout_secs: default_clone_timeout_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
            settle_secs: default_settle_secs(),
            max_repo_bytes: default_max_repo_bytes(),
        }
    }
}

fn default_image() -> String {
    "sonarsource/sonar-scanner-cli".to_string()
}
fn default_clone_timeout_secs() -> u64 {
    300
}
fn default_scan_timeout_secs() -> u64 {
    900
}
fn default_settle_secs() -> u64 {
    30
}
fn default_max_repo_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

impl ScannerConfig {
    pub fn temp_base(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("harvest-repos"))
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Default worker count; 1 = sequential with verbose per-step logging.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Load configuration from `path`. A missing file yields the defaults —
/// every setting has one — but an existing file that fails to parse or
/// validate is an error, never silently ignored.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.sonar.host.is_empty() {
        bail!("sonar.host must not be empty");
    }
    if config.analysis.workers == 0 {
        bail!("analysis.workers must be >= 1");
    }
    if config.scanner.clone_timeout_secs == 0 || config.scanner.scan_timeout_secs == 0 {
        bail!("scanner timeouts must be > 0");
    }
    if config.scanner.max_repo_bytes == 0 {
        bail!("scanner.max_repo_bytes must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.sonar.host, "http://localhost:9000");
        assert_eq!(cfg.analysis.workers, 1);
        assert_eq!(cfg.scanner.max_repo_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(cfg.scanner.scan_timeout_secs, 900);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [sonar]
            host = "http://sonar.internal:9000"

            [analysis]
            workers = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sonar.host, "http://sonar.internal:9000");
        assert_eq!(cfg.analysis.workers, 4);
        assert_eq!(cfg.scanner.image, "sonarsource/sonar-scanner-cli");
    }
}
