//! abuse.ch URLhaus lookup (malicious URL / payload feed).
//!
//! Credential-free; subject only to the local rate limit. URLs are checked
//! against the URL endpoint, hashes against the payload endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::classify::{Detection, HashAlgo, IndicatorKind};
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://urlhaus-api.abuse.ch";

const MAX_TAGS: usize = 10;

/// Normalized URLhaus listing.
#[derive(Debug, Clone, Serialize)]
pub struct UrlHausReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_status: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    /// Related entries: payloads for a URL, URLs for a payload.
    pub related_count: usize,
}

pub struct UrlHausService {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl UrlHausService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.urlhaus.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

/// Endpoint and form field for an indicator kind.
fn request_parts(indicator: &Detection) -> Result<(&'static str, &'static str), ServiceError> {
    match indicator.kind {
        IndicatorKind::Url => Ok(("/v1/url/", "url")),
        IndicatorKind::Hash => match indicator.hash_algo {
            Some(HashAlgo::Md5) => Ok(("/v1/payload/", "md5_hash")),
            Some(HashAlgo::Sha256) => Ok(("/v1/payload/", "sha256_hash")),
            _ => Err(ServiceError::Api(
                "only md5 and sha256 digests are supported".to_string(),
            )),
        },
        other => Err(ServiceError::Api(format!(
            "unsupported indicator kind: {}",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl IntelService for UrlHausService {
    fn key(&self) -> ServiceKey {
        ServiceKey::UrlHaus
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let (endpoint, field) = request_parts(indicator)?;
        self.limiter.try_acquire(ServiceKey::UrlHaus).await?;

        debug!(indicator = %indicator.value, endpoint = endpoint, "URLhaus lookup");

        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .form(&[(field, indicator.value.as_str())])
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

        let entry: QueryResponse = response.json().await.map_err(parse_error)?;
        match entry.query_status.as_str() {
            "ok" => Ok(ServiceReport::UrlHaus(normalize(entry))),
            "no_results" => Err(ServiceError::NotFound),
            other => Err(ServiceError::Api(format!("query status: {other}"))),
        }
    }
}

fn normalize(entry: QueryResponse) -> UrlHausReport {
    let related_count = entry
        .payloads
        .as_ref()
        .map(Vec::len)
        .or_else(|| entry.urls.as_ref().map(Vec::len))
        .unwrap_or(0);

    UrlHausReport {
        threat: entry.threat.or(entry.signature),
        url_status: entry.url_status,
        tags: truncate(entry.tags.unwrap_or_default(), MAX_TAGS),
        first_seen: entry.date_added.or(entry.firstseen),
        related_count,
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query_status: String,
    threat: Option<String>,
    url_status: Option<String>,
    tags: Option<Vec<String>>,
    date_added: Option<String>,
    // Payload responses use these fields instead.
    signature: Option<String>,
    firstseen: Option<String>,
    payloads: Option<Vec<serde_json::Value>>,
    urls: Option<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use serde_json::json;

    #[test]
    fn test_request_parts_per_kind() {
        assert_eq!(
            request_parts(&classify("http://evil.example/payload.exe")).unwrap(),
            ("/v1/url/", "url")
        );
        assert_eq!(
            request_parts(&classify("d41d8cd98f00b204e9800998ecf8427e")).unwrap(),
            ("/v1/payload/", "md5_hash")
        );
        assert_eq!(
            request_parts(&classify(
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            ))
            .unwrap(),
            ("/v1/payload/", "sha256_hash")
        );
        // sha1 is not a URLhaus lookup key
        assert!(request_parts(&classify("da39a3ee5e6b4b0d3255bfef95601890afd80709")).is_err());
    }

    #[test]
    fn test_normalize_url_entry() {
        let entry: QueryResponse = serde_json::from_value(json!({
            "query_status": "ok",
            "threat": "malware_download",
            "url_status": "online",
            "tags": ["elf", "mozi"],
            "date_added": "2024-01-15 06:10:02 UTC",
            "payloads": [{"md5_hash": "x"}, {"md5_hash": "y"}]
        }))
        .unwrap();

        let report = normalize(entry);
        assert_eq!(report.threat.as_deref(), Some("malware_download"));
        assert_eq!(report.related_count, 2);
        assert_eq!(report.tags, vec!["elf", "mozi"]);
    }

    #[test]
    fn test_normalize_payload_entry() {
        let entry: QueryResponse = serde_json::from_value(json!({
            "query_status": "ok",
            "signature": "Mozi",
            "firstseen": "2024-01-10",
            "urls": [{"url": "http://a"}, {"url": "http://b"}, {"url": "http://c"}]
        }))
        .unwrap();

        let report = normalize(entry);
        assert_eq!(report.threat.as_deref(), Some("Mozi"));
        assert_eq!(report.related_count, 3);
        assert_eq!(report.first_seen.as_deref(), Some("2024-01-10"));
    }
}
