//! urlscan.io search (historical scans of a URL or domain).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::classify::{Detection, IndicatorKind};
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://urlscan.io";

const MAX_HITS: usize = 10;

/// Normalized urlscan.io search results.
#[derive(Debug, Clone, Serialize)]
pub struct UrlScanReport {
    /// Total scans matched (before truncation).
    pub total: u64,
    pub scans: Vec<UrlScanHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlScanHit {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

pub struct UrlScanService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl UrlScanService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.urlscan.resolved_api_key(),
            base_url: config.urlscan.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

fn search_query(indicator: &Detection) -> Result<String, ServiceError> {
    match indicator.kind {
        IndicatorKind::Url => Ok(format!("page.url:\"{}\"", indicator.value)),
        IndicatorKind::Domain => Ok(format!("domain:{}", indicator.value)),
        other => Err(ServiceError::Api(format!(
            "unsupported indicator kind: {}",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl IntelService for UrlScanService {
    fn key(&self) -> ServiceKey {
        ServiceKey::UrlScan
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        let query = search_query(indicator)?;
        self.limiter.try_acquire(ServiceKey::UrlScan).await?;

        debug!(query = %query, "urlscan.io search");

        let response = self
            .client
            .get(format!("{}/api/v1/search/", self.base_url))
            .header("API-Key", api_key)
            .query(&[("q", query.as_str()), ("size", "25")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 401 {
            return Err(ServiceError::Api("invalid urlscan.io API key".to_string()));
        }
        if status == 429 {
            return Err(ServiceError::RateLimited {
                retry_after_secs: retry_after_secs(&response, 60),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let search: SearchResponse = response.json().await.map_err(parse_error)?;
        if search.total == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(ServiceReport::UrlScan(normalize(search)))
    }
}

fn normalize(search: SearchResponse) -> UrlScanReport {
    UrlScanReport {
        total: search.total,
        scans: truncate(
            search
                .results
                .into_iter()
                .map(|hit| UrlScanHit {
                    url: hit.task.url,
                    page_domain: hit.page.domain,
                    page_ip: hit.page.ip,
                    scanned_at: hit.task.time.as_deref().and_then(parse_scan_time),
                    result_url: hit.result,
                })
                .collect(),
            MAX_HITS,
        ),
    }
}

fn parse_scan_time(time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    task: TaskInfo,
    #[serde(default)]
    page: PageInfo,
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskInfo {
    #[serde(default)]
    url: String,
    time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageInfo {
    domain: Option<String>,
    ip: Option<String>,
}
