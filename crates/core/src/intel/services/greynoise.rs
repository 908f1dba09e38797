//! GreyNoise community lookup (internet background noise classification).

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

const DEFAULT_BASE_URL: &str = "https://api.greynoise.io";

/// Normalized GreyNoise verdict for an IP.
#[derive(Debug, Clone, Serialize)]
pub struct GreyNoiseReport {
    pub ip: String,
    /// Observed scanning the internet at large.
    pub noise: bool,
    /// Belongs to a known benign service (RIOT data set).
    pub riot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

pub struct GreyNoiseService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl GreyNoiseService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.greynoise.resolved_api_key(),
            base_url: config.greynoise.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for GreyNoiseService {
    fn key(&self) -> ServiceKey {
        ServiceKey::GreyNoise
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::GreyNoise).await?;

        let url = format!("{}/v3/community/{}", self.base_url, indicator.value);
        debug!(ip = %indicator.value, "GreyNoise community lookup");

        let response = self
            .client
            .get(&url)
            .header("key", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // GreyNoise reports "never observed" as 404 with a message body.
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 {
            return Err(ServiceError::Api("invalid GreyNoise API key".to_string()));
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

        let verdict: CommunityResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::GreyNoise(GreyNoiseReport {
            ip: verdict.ip.unwrap_or_else(|| indicator.value.clone()),
            noise: verdict.noise,
            riot: verdict.riot,
            classification: verdict.classification,
            actor: verdict.name,
            last_seen: verdict.last_seen,
            link: verdict.link,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CommunityResponse {
    ip: Option<String>,
    #[serde(default)]
    noise: bool,
    #[serde(default)]
    riot: bool,
    classification: Option<String>,
    name: Option<String>,
    last_seen: Option<String>,
    link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_community_wire_shape() {
        let verdict: CommunityResponse = serde_json::from_value(json!({
            "ip": "1.2.3.4",
            "noise": true,
            "riot": false,
            "classification": "malicious",
            "name": "unknown",
            "link": "https://viz.greynoise.io/ip/1.2.3.4",
            "last_seen": "2024-11-02"
        }))
        .unwrap();
        assert!(verdict.noise);
        assert_eq!(verdict.classification.as_deref(), Some("malicious"));
    }

    #[test]
    fn test_community_wire_shape_minimal() {
        let verdict: CommunityResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!verdict.noise);
        assert!(!verdict.riot);
    }
}
