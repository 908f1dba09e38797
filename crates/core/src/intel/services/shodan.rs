//! Shodan host lookup (port/service scan data for an IP).

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

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";

const MAX_PORTS: usize = 50;
const MAX_HOSTNAMES: usize = 10;
const MAX_VULNS: usize = 25;
const MAX_BANNERS: usize = 10;

/// Normalized Shodan host report.
#[derive(Debug, Clone, Serialize)]
pub struct ShodanReport {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub open_ports: Vec<u16>,
    pub hostnames: Vec<String>,
    pub vulns: Vec<String>,
    pub banners: Vec<ShodanBanner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

/// One service banner from the host's scan data.
#[derive(Debug, Clone, Serialize)]
pub struct ShodanBanner {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

pub struct ShodanService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl ShodanService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.shodan.resolved_api_key(),
            base_url: config.shodan.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for ShodanService {
    fn key(&self) -> ServiceKey {
        ServiceKey::Shodan
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::Shodan).await?;

        let url = format!("{}/shodan/host/{}", self.base_url, indicator.value);
        debug!(ip = %indicator.value, "Shodan host lookup");

        let response = self
            .client
            .get(&url)
            .query(&[("key", api_key)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 {
            return Err(ServiceError::Api("invalid Shodan API key".to_string()));
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

        let host: ShodanHostResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::Shodan(normalize(&indicator.value, host)))
    }
}

fn normalize(ip: &str, host: ShodanHostResponse) -> ShodanReport {
    ShodanReport {
        ip: ip.to_string(),
        org: host.org,
        isp: host.isp,
        os: host.os,
        country: host.country_name,
        open_ports: truncate(host.ports, MAX_PORTS),
        hostnames: truncate(host.hostnames, MAX_HOSTNAMES),
        vulns: truncate(host.vulns, MAX_VULNS),
        banners: truncate(
            host.data
                .into_iter()
                .map(|entry| ShodanBanner {
                    port: entry.port,
                    transport: entry.transport,
                    product: entry.product,
                })
                .collect(),
            MAX_BANNERS,
        ),
        last_update: host.last_update,
    }
}

#[derive(Debug, Deserialize)]
struct ShodanHostResponse {
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    hostnames: Vec<String>,
    #[serde(default)]
    vulns: Vec<String>,
    org: Option<String>,
    isp: Option<String>,
    os: Option<String>,
    country_name: Option<String>,
    last_update: Option<String>,
    #[serde(default)]
    data: Vec<ShodanDataEntry>,
}

#[derive(Debug, Deserialize)]
struct ShodanDataEntry {
    port: u16,
    transport: Option<String>,
    product: Option<String>,
}
