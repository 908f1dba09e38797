//! crt.sh certificate transparency lookup (subdomain discovery).
//!
//! Credential-free; subject only to the local rate limit.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::classify::Detection;
use crate::config::IntelConfig;
use crate::intel::rate_limiter::RateLimiter;
use crate::intel::types::{IntelService, ServiceError, ServiceKey, ServiceReport};

use super::{http_client, parse_error, retry_after_secs, transport_error};

const DEFAULT_BASE_URL: &str = "https://crt.sh";

const MAX_SUBDOMAINS: usize = 50;
const MAX_ISSUERS: usize = 5;

/// Normalized certificate-transparency report for a domain.
#[derive(Debug, Clone, Serialize)]
pub struct CtLogReport {
    /// Total log entries matched (before truncation).
    pub entry_count: usize,
    /// Distinct names seen in certificates for the domain, sorted.
    pub subdomains: Vec<String>,
    /// Distinct issuing CAs, sorted.
    pub issuers: Vec<String>,
}

pub struct CrtShService {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl CrtShService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.crtsh.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for CrtShService {
    fn key(&self) -> ServiceKey {
        ServiceKey::CrtSh
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        self.limiter.try_acquire(ServiceKey::CrtSh).await?;

        debug!(domain = %indicator.value, "crt.sh certificate log lookup");

        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", format!("%.{}", indicator.value)),
                ("output", "json".to_string()),
            ])
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

        let entries: Vec<LogEntry> = response.json().await.map_err(parse_error)?;
        if entries.is_empty() {
            // crt.sh reports "no records" as an empty array, not a 404.
            return Err(ServiceError::NotFound);
        }
        Ok(ServiceReport::CrtSh(normalize(entries)))
    }
}

fn normalize(entries: Vec<LogEntry>) -> CtLogReport {
    let entry_count = entries.len();

    let mut subdomains = BTreeSet::new();
    let mut issuers = BTreeSet::new();
    for entry in entries {
        // name_value holds one certificate name per line.
        for name in entry.name_value.lines() {
            let name = name.trim().trim_start_matches("*.").to_ascii_lowercase();
            if !name.is_empty() {
                subdomains.insert(name);
            }
        }
        if let Some(issuer) = entry.issuer_name {
            issuers.insert(issuer);
        }
    }

    CtLogReport {
        entry_count,
        subdomains: subdomains.into_iter().take(MAX_SUBDOMAINS).collect(),
        issuers: issuers.into_iter().take(MAX_ISSUERS).collect(),
    }
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    name_value: String,
    issuer_name: Option<String>,
}
