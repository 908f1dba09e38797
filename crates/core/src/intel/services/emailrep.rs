//! EmailRep.io reputation lookup for an email address.

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

const DEFAULT_BASE_URL: &str = "https://emailrep.io";

const MAX_PROFILES: usize = 10;

/// Normalized EmailRep reputation report.
#[derive(Debug, Clone, Serialize)]
pub struct EmailRepReport {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reputation: Option<String>,
    pub suspicious: bool,
    /// How many sources reference this address.
    pub references: u32,
    pub blacklisted: bool,
    pub malicious_activity: bool,
    pub credentials_leaked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    /// Online profiles registered to the address.
    pub profiles: Vec<String>,
}

pub struct EmailRepService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl EmailRepService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.emailrep.resolved_api_key(),
            base_url: config.emailrep.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for EmailRepService {
    fn key(&self) -> ServiceKey {
        ServiceKey::EmailRep
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::EmailRep).await?;

        let url = format!(
            "{}/{}",
            self.base_url,
            urlencoding::encode(&indicator.value)
        );
        debug!(email = %indicator.value, "EmailRep lookup");

        let response = self
            .client
            .get(&url)
            .header("Key", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 || status == 403 {
            return Err(ServiceError::Api("invalid EmailRep API key".to_string()));
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

        let rep: RepResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::EmailRep(normalize(&indicator.value, rep)))
    }
}

fn normalize(email: &str, rep: RepResponse) -> EmailRepReport {
    let details = rep.details.unwrap_or_default();
    EmailRepReport {
        email: rep.email.unwrap_or_else(|| email.to_string()),
        reputation: rep.reputation,
        suspicious: rep.suspicious,
        references: rep.references,
        blacklisted: details.blacklisted,
        malicious_activity: details.malicious_activity,
        credentials_leaked: details.credentials_leaked,
        first_seen: details.first_seen,
        profiles: truncate(details.profiles, MAX_PROFILES),
    }
}

#[derive(Debug, Deserialize)]
struct RepResponse {
    email: Option<String>,
    reputation: Option<String>,
    #[serde(default)]
    suspicious: bool,
    #[serde(default)]
    references: u32,
    details: Option<RepDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct RepDetails {
    #[serde(default)]
    blacklisted: bool,
    #[serde(default)]
    malicious_activity: bool,
    #[serde(default)]
    credentials_leaked: bool,
    first_seen: Option<String>,
    #[serde(default)]
    profiles: Vec<String>,
}
