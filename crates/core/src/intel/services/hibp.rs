//! Have I Been Pwned breach lookup for an email address.

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

const DEFAULT_BASE_URL: &str = "https://haveibeenpwned.com";

const MAX_BREACHES: usize = 20;
const MAX_DATA_CLASSES: usize = 8;

/// Normalized breach history for an account.
#[derive(Debug, Clone, Serialize)]
pub struct BreachReport {
    /// Total breaches the account appears in (before truncation).
    pub breach_count: usize,
    pub breaches: Vec<Breach>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Breach {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breach_date: Option<String>,
    pub pwn_count: u64,
    pub data_classes: Vec<String>,
    pub verified: bool,
}

pub struct HibpService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl HibpService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.hibp.resolved_api_key(),
            base_url: config.hibp.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for HibpService {
    fn key(&self) -> ServiceKey {
        ServiceKey::Hibp
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::Hibp).await?;

        let url = format!(
            "{}/api/v3/breachedaccount/{}",
            self.base_url,
            urlencoding::encode(&indicator.value)
        );
        debug!(account = %indicator.value, "HIBP breach lookup");

        let response = self
            .client
            .get(&url)
            .header("hibp-api-key", api_key)
            .query(&[("truncateResponse", "false")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // HIBP reports "not breached" as 404.
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 {
            return Err(ServiceError::Api("invalid HIBP API key".to_string()));
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

        let breaches: Vec<BreachEntry> = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::Hibp(normalize(breaches)))
    }
}

fn normalize(entries: Vec<BreachEntry>) -> BreachReport {
    BreachReport {
        breach_count: entries.len(),
        breaches: truncate(
            entries
                .into_iter()
                .map(|entry| Breach {
                    name: entry.title.unwrap_or(entry.name),
                    domain: entry.domain.filter(|d| !d.is_empty()),
                    breach_date: entry.breach_date,
                    pwn_count: entry.pwn_count,
                    data_classes: truncate(entry.data_classes, MAX_DATA_CLASSES),
                    verified: entry.is_verified,
                })
                .collect(),
            MAX_BREACHES,
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BreachEntry {
    name: String,
    title: Option<String>,
    domain: Option<String>,
    breach_date: Option<String>,
    #[serde(default)]
    pwn_count: u64,
    #[serde(default)]
    data_classes: Vec<String>,
    #[serde(default)]
    is_verified: bool,
}
