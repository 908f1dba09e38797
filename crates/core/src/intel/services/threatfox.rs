//! abuse.ch ThreatFox IOC search.
//!
//! Credential-free; subject only to the local rate limit.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::classify::Detection;
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://threatfox-api.abuse.ch";

const MAX_MATCHES: usize = 10;

/// Normalized ThreatFox IOC matches.
#[derive(Debug, Clone, Serialize)]
pub struct IocFeedReport {
    pub match_count: usize,
    pub matches: Vec<IocMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IocMatch {
    pub ioc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ioc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
}

pub struct ThreatFoxService {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl ThreatFoxService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.threatfox.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for ThreatFoxService {
    fn key(&self) -> ServiceKey {
        ServiceKey::ThreatFox
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        self.limiter.try_acquire(ServiceKey::ThreatFox).await?;

        debug!(indicator = %indicator.value, "ThreatFox IOC search");

        let response = self
            .client
            .post(format!("{}/api/v1/", self.base_url))
            .json(&json!({
                "query": "search_ioc",
                "search_term": indicator.value,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
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

        let envelope: SearchResponse = response.json().await.map_err(parse_error)?;
        match envelope.query_status.as_str() {
            "ok" => Ok(ServiceReport::ThreatFox(normalize(envelope.data))),
            "no_result" => Err(ServiceError::NotFound),
            other => Err(ServiceError::Api(format!("query status: {other}"))),
        }
    }
}

fn normalize(data: Vec<IocEntry>) -> IocFeedReport {
    IocFeedReport {
        match_count: data.len(),
        matches: truncate(
            data.into_iter()
                .map(|entry| IocMatch {
                    ioc: entry.ioc,
                    ioc_type: entry.ioc_type,
                    threat_type: entry.threat_type,
                    malware: entry.malware_printable.or(entry.malware),
                    confidence: entry.confidence_level,
                    first_seen: entry.first_seen,
                })
                .collect(),
            MAX_MATCHES,
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query_status: String,
    #[serde(default)]
    data: Vec<IocEntry>,
}

#[derive(Debug, Deserialize)]
struct IocEntry {
    ioc: String,
    ioc_type: Option<String>,
    threat_type: Option<String>,
    malware: Option<String>,
    malware_printable: Option<String>,
    confidence_level: Option<u32>,
    first_seen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_wire_shape_with_matches() {
        let envelope: SearchResponse = serde_json::from_value(serde_json::json!({
            "query_status": "ok",
            "data": [{
                "ioc": "1.2.3.4:4444",
                "ioc_type": "ip:port",
                "threat_type": "botnet_cc",
                "malware": "win.cobalt_strike",
                "malware_printable": "Cobalt Strike",
                "confidence_level": 75,
                "first_seen": "2024-03-01 07:42:00 UTC"
            }]
        }))
        .unwrap();

        let report = normalize(envelope.data);
        assert_eq!(report.match_count, 1);
        assert_eq!(report.matches[0].malware.as_deref(), Some("Cobalt Strike"));
    }

    #[test]
    fn test_no_result_status() {
        let envelope: SearchResponse = serde_json::from_value(serde_json::json!({
            "query_status": "no_result"
        }))
        .unwrap();
        assert_eq!(envelope.query_status, "no_result");
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_normalize_caps_matches() {
        let data: Vec<IocEntry> = (0..40)
            .map(|i| IocEntry {
                ioc: format!("bad{i}.example.com"),
                ioc_type: None,
                threat_type: None,
                malware: None,
                malware_printable: None,
                confidence_level: None,
                first_seen: None,
            })
            .collect();
        let report = normalize(data);
        assert_eq!(report.match_count, 40);
        assert_eq!(report.matches.len(), MAX_MATCHES);
    }
}
