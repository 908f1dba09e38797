//! AbuseIPDB reputation check.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::classify::Detection;
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.abuseipdb.com";

/// Look back this far when asking for reports.
const MAX_AGE_DAYS: u32 = 90;

/// Normalized AbuseIPDB reputation report.
#[derive(Debug, Clone, Serialize)]
pub struct AbuseIpdbReport {
    pub ip_address: String,
    /// 0-100; AbuseIPDB's own confidence that the address is abusive.
    pub abuse_confidence_score: u32,
    pub total_reports: u32,
    pub distinct_reporters: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reported_at: Option<String>,
}

pub struct AbuseIpdbService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl AbuseIpdbService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.abuseipdb.resolved_api_key(),
            base_url: config.abuseipdb.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for AbuseIpdbService {
    fn key(&self) -> ServiceKey {
        ServiceKey::AbuseIpdb
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::AbuseIpdb).await?;

        let url = format!("{}/api/v2/check", self.base_url);
        debug!(ip = %indicator.value, "AbuseIPDB check");

        let response = self
            .client
            .get(&url)
            .header("Key", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("ipAddress", indicator.value.as_str()),
                ("maxAgeInDays", &MAX_AGE_DAYS.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 || status == 403 {
            return Err(ServiceError::Api("invalid AbuseIPDB API key".to_string()));
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

        let envelope: CheckResponse = response.json().await.map_err(parse_error)?;
        let data = envelope.data;
        Ok(ServiceReport::AbuseIpdb(AbuseIpdbReport {
            ip_address: data.ip_address.unwrap_or_else(|| indicator.value.clone()),
            abuse_confidence_score: data.abuse_confidence_score,
            total_reports: data.total_reports,
            distinct_reporters: data.num_distinct_users,
            country_code: data.country_code,
            isp: data.isp,
            usage_type: data.usage_type,
            last_reported_at: data.last_reported_at,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    data: CheckData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckData {
    ip_address: Option<String>,
    #[serde(default)]
    abuse_confidence_score: u32,
    #[serde(default)]
    total_reports: u32,
    #[serde(default)]
    num_distinct_users: u32,
    country_code: Option<String>,
    isp: Option<String>,
    usage_type: Option<String>,
    last_reported_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_wire_shape() {
        let envelope: CheckResponse = serde_json::from_value(json!({
            "data": {
                "ipAddress": "118.25.6.39",
                "abuseConfidenceScore": 100,
                "totalReports": 760,
                "numDistinctUsers": 78,
                "countryCode": "CN",
                "isp": "Tencent Cloud Computing",
                "usageType": "Data Center/Web Hosting/Transit",
                "lastReportedAt": "2024-10-20T08:14:33+00:00"
            }
        }))
        .unwrap();

        assert_eq!(envelope.data.abuse_confidence_score, 100);
        assert_eq!(envelope.data.num_distinct_users, 78);
        assert_eq!(envelope.data.country_code.as_deref(), Some("CN"));
    }
}
