//! Core data models used throughout Sonar Harvest.
//!
//! These types represent the repository records, quality metrics, and
//! dataset metadata that flow through the analysis and recovery pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Release cadence classification assigned by the collection phase.
///
/// Read-only within this crate: analysis never reclassifies a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Rapid,
    Slow,
    #[default]
    Unclassified,
}

impl ReleaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseType::Rapid => "rapid",
            ReleaseType::Slow => "slow",
            ReleaseType::Unclassified => "unclassified",
        }
    }

    /// Parse the persisted form. Unknown text maps to `Unclassified` —
    /// a bad label must not make a whole dataset unreadable.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "rapid" => ReleaseType::Rapid,
            "slow" => ReleaseType::Slow,
            _ => ReleaseType::Unclassified,
        }
    }
}

/// The thirteen SonarQube measures this study collects.
///
/// Every field is optional: a field the measures API did not return stays
/// `None`, which is distinct from a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SonarMetrics {
    pub bugs: Option<u64>,
    pub vulnerabilities: Option<u64>,
    pub code_smells: Option<u64>,
    pub sqale_index: Option<u64>,
    pub coverage: Option<f64>,
    pub duplicated_lines_density: Option<f64>,
    pub ncloc: Option<u64>,
    pub complexity: Option<u64>,
    pub cognitive_complexity: Option<u64>,
    pub reliability_rating: Option<String>,
    pub security_rating: Option<String>,
    pub sqale_rating: Option<String>,
    pub alert_status: Option<String>,
}

impl SonarMetrics {
    /// Metric keys in the order they are requested from the measures API
    /// and written as CSV extension columns.
    pub const KEYS: [&'static str; 13] = [
        "bugs",
        "vulnerabilities",
        "code_smells",
        "sqale_index",
        "coverage",
        "duplicated_lines_density",
        "ncloc",
        "complexity",
        "cognitive_complexity",
        "reliability_rating",
        "security_rating",
        "sqale_rating",
        "alert_status",
    ];

    /// Apply one measure value by its metric key. Values arrive as strings
    /// from both the API and CSV; an unparsable value is kept as `None`.
    pub fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match key {
            "bugs" => self.bugs = value.parse().ok(),
            "vulnerabilities" => self.vulnerabilities = value.parse().ok(),
            "code_smells" => self.code_smells = value.parse().ok(),
            "sqale_index" => self.sqale_index = value.parse().ok(),
            "coverage" => self.coverage = value.parse().ok(),
            "duplicated_lines_density" => self.duplicated_lines_density = value.parse().ok(),
            "ncloc" => self.ncloc = value.parse().ok(),
            "complexity" => self.complexity = value.parse().ok(),
            "cognitive_complexity" => self.cognitive_complexity = value.parse().ok(),
            "reliability_rating" => self.reliability_rating = Some(value.to_string()),
            "security_rating" => self.security_rating = Some(value.to_string()),
            "sqale_rating" => self.sqale_rating = Some(value.to_string()),
            "alert_status" => self.alert_status = Some(value.to_string()),
            _ => {}
        }
    }

    /// Retrieve a measure as its persisted string form, by metric key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "bugs" => self.bugs.map(|v| v.to_string()),
            "vulnerabilities" => self.vulnerabilities.map(|v| v.to_string()),
            "code_smells" => self.code_smells.map(|v| v.to_string()),
            "sqale_index" => self.sqale_index.map(|v| v.to_string()),
            "coverage" => self.coverage.map(|v| v.to_string()),
            "duplicated_lines_density" => self.duplicated_lines_density.map(|v| v.to_string()),
            "ncloc" => self.ncloc.map(|v| v.to_string()),
            "complexity" => self.complexity.map(|v| v.to_string()),
            "cognitive_complexity" => self.cognitive_complexity.map(|v| v.to_string()),
            "reliability_rating" => self.reliability_rating.clone(),
            "security_rating" => self.security_rating.clone(),
            "sqale_rating" => self.sqale_rating.clone(),
            "alert_status" => self.alert_status.clone(),
            _ => None,
        }
    }

    /// True when no measure at all was captured.
    pub fn is_empty(&self) -> bool {
        Self::KEYS.iter().all(|k| self.get(k).is_none())
    }
}

/// One repository in the dataset.
///
/// Identity is the (`owner`, `name`) pair; `full_name()` is a display
/// composite, never a storage key. Classification attributes are set by
/// the collection phase and read-only here. Processing state is mutated
/// only through the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub release_count: u64,
    #[serde(default)]
    pub contributors: u64,
    #[serde(default)]
    pub median_release_interval: f64,
    #[serde(default)]
    pub release_type: ReleaseType,
    #[serde(default, rename = "sonarqube_analyzed")]
    pub analyzed: bool,
    #[serde(default, rename = "sonarqube_analyzed_at")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "sonarqube_metrics")]
    pub metrics: Option<SonarMetrics>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl RepoRecord {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoRecord {
            owner: owner.into(),
            name: name.into(),
            stars: 0,
            forks: 0,
            language: None,
            release_count: 0,
            contributors: 0,
            median_release_interval: 0.0,
            release_type: ReleaseType::Unclassified,
            analyzed: false,
            analyzed_at: None,
            metrics: None,
            failure_reason: None,
        }
    }

    /// `owner/name`, for display and progress lines only.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Whether this record matches the identity pair.
    pub fn matches(&self, owner: &str, name: &str) -> bool {
        self.owner == owner && self.name == name
    }

    /// Record a successful analysis. Clears any earlier failure.
    pub fn mark_analyzed(&mut self, metrics: SonarMetrics, at: DateTime<Utc>) {
        self.analyzed = true;
        self.analyzed_at = Some(at);
        self.metrics = Some(metrics);
        self.failure_reason = None;
    }

    /// Record a failed attempt. The record stays pending for a future run.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.analyzed = false;
        self.failure_reason = Some(reason.into());
    }
}

/// An ordered collection of repository records plus dataset metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub repositories: Vec<RepoRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        let now = Utc::now();
        Dataset {
            created_at: now,
            last_updated_at: now,
            repositories: Vec::new(),
        }
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_type_parse_is_lenient() {
        assert_eq!(ReleaseType::parse("rapid"), ReleaseType::Rapid);
        assert_eq!(ReleaseType::parse(" Slow "), ReleaseType::Slow);
        assert_eq!(ReleaseType::parse("weird"), ReleaseType::Unclassified);
        assert_eq!(ReleaseType::parse(""), ReleaseType::Unclassified);
    }

    #[test]
    fn metrics_set_get_roundtrip() {
        let mut m = SonarMetrics::default();
        m.set("bugs", "12");
        m.set("coverage", "85.4");
        m.set("alert_status", "OK");
        m.set("ncloc", "");
        assert_eq!(m.bugs, Some(12));
        assert_eq!(m.coverage, Some(85.4));
        assert_eq!(m.get("alert_status").as_deref(), Some("OK"));
        assert_eq!(m.ncloc, None);
        assert!(!m.is_empty());
        assert!(SonarMetrics::default().is_empty());
    }

    #[test]
    fn unparsable_measure_stays_none() {
        let mut m = SonarMetrics::default();
        m.set("bugs", "not-a-number");
        assert_eq!(m.bugs, None);
    }

    #[test]
    fn mark_analyzed_clears_failure() {
        let mut r = RepoRecord::new("owner", "repo");
        r.mark_failed("scan failed");
        assert!(!r.analyzed);
        assert_eq!(r.failure_reason.as_deref(), Some("scan failed"));

        r.mark_analyzed(SonarMetrics::default(), chrono::Utc::now());
        assert!(r.analyzed);
        assert!(r.metrics.is_some());
        assert!(r.failure_reason.is_none());
    }
}
