//! SecurityTrails current-DNS lookup for a domain.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::classify::Detection;
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://api.securitytrails.com";

const MAX_RECORDS: usize = 10;
const MAX_TXT_RECORDS: usize = 5;

/// Normalized DNS snapshot for a domain.
#[derive(Debug, Clone, Serialize)]
pub struct DnsReport {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apex_domain: Option<String>,
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<String>,
    pub ns: Vec<String>,
    pub txt: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alexa_rank: Option<u64>,
}

pub struct SecurityTrailsService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl SecurityTrailsService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.securitytrails.resolved_api_key(),
            base_url: config.securitytrails.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for SecurityTrailsService {
    fn key(&self) -> ServiceKey {
        ServiceKey::SecurityTrails
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::SecurityTrails).await?;

        let url = format!(
            "{}/v1/domain/{}",
            self.base_url,
            urlencoding::encode(&indicator.value)
        );
        debug!(domain = %indicator.value, "SecurityTrails domain lookup");

        let response = self
            .client
            .get(&url)
            .header("APIKEY", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 || status == 403 {
            return Err(ServiceError::Api(
                "invalid SecurityTrails API key".to_string(),
            ));
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

        let domain: DomainResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::SecurityTrails(normalize(
            &indicator.value,
            domain,
        )))
    }
}

fn normalize(hostname: &str, domain: DomainResponse) -> DnsReport {
    let dns = domain.current_dns.unwrap_or_default();
    DnsReport {
        hostname: domain.hostname.unwrap_or_else(|| hostname.to_string()),
        apex_domain: domain.apex_domain,
        a: truncate(dns.a.values("ip"), MAX_RECORDS),
        aaaa: truncate(dns.aaaa.values("ip"), MAX_RECORDS),
        mx: truncate(dns.mx.values("hostname"), MAX_RECORDS),
        ns: truncate(dns.ns.values("nameserver"), MAX_RECORDS),
        txt: truncate(dns.txt.values("value"), MAX_TXT_RECORDS),
        alexa_rank: domain.alexa_rank,
    }
}

#[derive(Debug, Deserialize)]
struct DomainResponse {
    hostname: Option<String>,
    apex_domain: Option<String>,
    alexa_rank: Option<u64>,
    current_dns: Option<CurrentDns>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentDns {
    #[serde(default)]
    a: RecordSet,
    #[serde(default)]
    aaaa: RecordSet,
    #[serde(default)]
    mx: RecordSet,
    #[serde(default)]
    ns: RecordSet,
    #[serde(default)]
    txt: RecordSet,
}

#[derive(Debug, Default, Deserialize)]
struct RecordSet {
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

impl RecordSet {
    /// Pull the named field out of each record value.
    fn values(&self, field: &str) -> Vec<String> {
        self.values
            .iter()
            .filter_map(|v| v.get(field))
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}
