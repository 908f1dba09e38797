//! VirusTotal file/URL report lookup.
//!
//! Uses the v2 report endpoints: URL lookups take the raw URL as the
//! `resource` parameter, so no identifier encoding is needed.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::classify::{Detection, IndicatorKind};
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://www.virustotal.com";

const MAX_ENGINE_HITS: usize = 10;

/// Normalized VirusTotal scan report.
#[derive(Debug, Clone, Serialize)]
pub struct VirusTotalReport {
    /// Engines that flagged the resource.
    pub detections: u32,
    /// Engines that scanned the resource.
    pub total_engines: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// The flagging engines and their verdicts.
    pub engine_hits: Vec<EngineHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineHit {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

pub struct VirusTotalService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl VirusTotalService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.virustotal.resolved_api_key(),
            base_url: config.virustotal.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

fn endpoint_for(indicator: &Detection) -> Result<&'static str, ServiceError> {
    match indicator.kind {
        IndicatorKind::Hash => Ok("/vtapi/v2/file/report"),
        IndicatorKind::Url => Ok("/vtapi/v2/url/report"),
        other => Err(ServiceError::Api(format!(
            "unsupported indicator kind: {}",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl IntelService for VirusTotalService {
    fn key(&self) -> ServiceKey {
        ServiceKey::VirusTotal
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        let endpoint = endpoint_for(indicator)?;
        self.limiter.try_acquire(ServiceKey::VirusTotal).await?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!(resource = %indicator.value, "VirusTotal report lookup");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apikey", api_key),
                ("resource", indicator.value.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 403 {
            return Err(ServiceError::Api("invalid VirusTotal API key".to_string()));
        }
        // The v2 API signals quota exhaustion with 204.
        if status == 429 || status == 204 {
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

        let report: ReportResponse = response.json().await.map_err(parse_error)?;
        // response_code 0 means the resource has never been scanned.
        if report.response_code != 1 {
            return Err(ServiceError::NotFound);
        }
        Ok(ServiceReport::VirusTotal(normalize(report)))
    }
}

fn normalize(report: ReportResponse) -> VirusTotalReport {
    let engine_hits = report
        .scans
        .into_iter()
        .filter(|(_, verdict)| verdict.detected)
        .map(|(engine, verdict)| EngineHit {
            engine,
            result: verdict.result,
        })
        .collect();

    VirusTotalReport {
        detections: report.positives,
        total_engines: report.total,
        scan_date: report.scan_date,
        permalink: report.permalink,
        engine_hits: truncate(engine_hits, MAX_ENGINE_HITS),
    }
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    response_code: i32,
    #[serde(default)]
    positives: u32,
    #[serde(default)]
    total: u32,
    scan_date: Option<String>,
    permalink: Option<String>,
    // BTreeMap keeps engine order deterministic after filtering.
    #[serde(default)]
    scans: BTreeMap<String, EngineVerdict>,
}

#[derive(Debug, Deserialize)]
struct EngineVerdict {
    #[serde(default)]
    detected: bool,
    result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use serde_json::json;

    #[test]
    fn test_endpoint_for_hash_and_url_only() {
        assert!(endpoint_for(&classify("d41d8cd98f00b204e9800998ecf8427e")).is_ok());
        assert!(endpoint_for(&classify("https://example.com/a.exe")).is_ok());
        assert!(endpoint_for(&classify("example.com")).is_err());
    }

    #[test]
    fn test_normalize_keeps_flagging_engines_only() {
        let report: ReportResponse = serde_json::from_value(json!({
            "response_code": 1,
            "positives": 2,
            "total": 70,
            "scan_date": "2024-09-12 10:22:01",
            "scans": {
                "EngineA": {"detected": true, "result": "Trojan.Generic"},
                "EngineB": {"detected": false, "result": null},
                "EngineC": {"detected": true, "result": "Win32.Agent"}
            }
        }))
        .unwrap();

        let normalized = normalize(report);
        assert_eq!(normalized.detections, 2);
        assert_eq!(normalized.total_engines, 70);
        assert_eq!(normalized.engine_hits.len(), 2);
        assert_eq!(normalized.engine_hits[0].engine, "EngineA");
    }

    #[test]
    fn test_unscanned_resource_has_response_code_zero() {
        let report: ReportResponse = serde_json::from_value(json!({
            "response_code": 0,
            "verbose_msg": "The requested resource is not among the finished scans"
        }))
        .unwrap();
        assert_eq!(report.response_code, 0);
    }
}
