//! SonarQube REST API client.
//!
//! Thin wrapper over the two endpoints this tool consumes: the system
//! status check and the measures/component query. The measures endpoint
//! is the scanner's own system of record, which is what makes offline
//! recovery ([`crate::recover`]) possible after a corrupted store write.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::models::SonarMetrics;

/// Anything that can resolve a sanitized project key to stored measures.
/// The live implementation is [`SonarClient`]; tests substitute a map.
#[async_trait]
pub trait MeasureSource: Send + Sync {
    /// `Ok(None)` means the project does not exist server-side — an
    /// informational miss, not an error.
    async fn fetch_measures(&self, project_key: &str) -> Result<Option<SonarMetrics>>;
}

pub struct SonarClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct MeasuresResponse {
    component: Option<ComponentBody>,
}

#[derive(Deserialize)]
struct ComponentBody {
    #[serde(default)]
    measures: Vec<Measure>,
}

#[derive(Deserialize)]
struct Measure {
    metric: String,
    #[serde(default)]
    value: Option<String>,
}

impl SonarClient {
    pub fn new(host: &str, token: &str, timeout: Duration) -> Result<SonarClient> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(SonarClient {
            base_url: host.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Check that the server is up; returns its reported status string.
    pub async fn system_status(&self) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/api/system/status", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("cannot reach SonarQube at {}", self.base_url))?
            .error_for_status()
            .context("SonarQube status check failed")?;

        let body: StatusResponse = response.json().await?;
        Ok(body.status.unwrap_or_else(|| "UNKNOWN".to_string()))
    }
}

#[async_trait]
impl MeasureSource for SonarClient {
    async fn fetch_measures(&self, project_key: &str) -> Result<Option<SonarMetrics>> {
        let metric_keys = SonarMetrics::KEYS.join(",");
        let response = self
            .http
            .get(format!("{}/api/measures/component", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("component", project_key),
                ("metricKeys", metric_keys.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("measures request failed for {}", project_key))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: MeasuresResponse = response
            .error_for_status()
            .with_context(|| format!("measures query rejected for {}", project_key))?
            .json()
            .await
            .context("malformed measures response")?;

        let Some(component) = body.component else {
            return Ok(None);
        };

        // Missing individual measures stay None: partial metrics are
        // still useful and must not look like a failed extraction.
        let mut metrics = SonarMetrics::default();
        for measure in &component.measures {
            if let Some(value) = &measure.value {
                metrics.set(&measure.metric, value);
            }
        }

        if metrics.is_empty() {
            Ok(None)
        } else {
            Ok(Some(metrics))
        }
    }
}
