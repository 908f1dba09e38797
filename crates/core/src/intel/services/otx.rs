//! AlienVault OTX pulse lookup.
//!
//! OTX covers four indicator kinds; the endpoint section differs per kind
//! but the pulse envelope is the same.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::classify::{Detection, IndicatorKind};
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error, truncate};

const DEFAULT_BASE_URL: &str = "https://otx.alienvault.com";

const MAX_PULSES: usize = 10;
const MAX_TAGS: usize = 8;

/// Normalized OTX threat-pulse summary.
#[derive(Debug, Clone, Serialize)]
pub struct OtxReport {
    /// Total pulses referencing the indicator (before truncation).
    pub pulse_count: u32,
    pub pulses: Vec<OtxPulse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtxPulse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub tags: Vec<String>,
}

pub struct OtxService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl OtxService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.otx.resolved_api_key(),
            base_url: config.otx.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

/// Endpoint section for an indicator kind, per the OTX API layout.
fn section_for(indicator: &Detection) -> Result<&'static str, ServiceError> {
    match indicator.kind {
        IndicatorKind::Ip => {
            if indicator.value.contains(':') {
                Ok("IPv6")
            } else {
                Ok("IPv4")
            }
        }
        IndicatorKind::Domain => Ok("domain"),
        IndicatorKind::Hash => Ok("file"),
        IndicatorKind::Url => Ok("url"),
        other => Err(ServiceError::Api(format!(
            "unsupported indicator kind: {}",
            other.as_str()
        ))),
    }
}

#[async_trait]
impl IntelService for OtxService {
    fn key(&self) -> ServiceKey {
        ServiceKey::Otx
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        let section = section_for(indicator)?;
        self.limiter.try_acquire(ServiceKey::Otx).await?;

        let url = format!(
            "{}/api/v1/indicators/{}/{}/general",
            self.base_url,
            section,
            urlencoding::encode(&indicator.value)
        );
        debug!(indicator = %indicator.value, section = section, "OTX pulse lookup");

        let response = self
            .client
            .get(&url)
            .header("X-OTX-API-KEY", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 403 {
            return Err(ServiceError::Api("invalid OTX API key".to_string()));
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

        let general: GeneralResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::Otx(normalize(general)))
    }
}

fn normalize(general: GeneralResponse) -> OtxReport {
    let info = general.pulse_info.unwrap_or_default();
    OtxReport {
        pulse_count: info.count,
        pulses: truncate(
            info.pulses
                .into_iter()
                .map(|p| OtxPulse {
                    name: p.name,
                    created: p.created,
                    tags: truncate(p.tags, MAX_TAGS),
                })
                .collect(),
            MAX_PULSES,
        ),
    }
}

#[derive(Debug, Deserialize)]
struct GeneralResponse {
    pulse_info: Option<PulseInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct PulseInfo {
    #[serde(default)]
    count: u32,
    #[serde(default)]
    pulses: Vec<PulseEntry>,
}

#[derive(Debug, Deserialize)]
struct PulseEntry {
    name: String,
    created: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}
