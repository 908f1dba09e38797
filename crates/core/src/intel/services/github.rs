//! GitHub user profile lookup for a username indicator.

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

const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Normalized GitHub profile.
#[derive(Debug, Clone, Serialize)]
pub struct GitHubReport {
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub public_repos: u32,
    pub followers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

pub struct GitHubService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl GitHubService {
    pub fn new(config: &IntelConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key: config.github.resolved_api_key(),
            base_url: config.github.base_url_or(DEFAULT_BASE_URL),
            limiter,
        }
    }
}

#[async_trait]
impl IntelService for GitHubService {
    fn key(&self) -> ServiceKey {
        ServiceKey::GitHub
    }

    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        let token = self.api_key.as_deref().ok_or(ServiceError::ApiKeyMissing)?;
        self.limiter.try_acquire(ServiceKey::GitHub).await?;

        let url = format!(
            "{}/users/{}",
            self.base_url,
            urlencoding::encode(&indicator.value)
        );
        debug!(username = %indicator.value, "GitHub profile lookup");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 404 {
            return Err(ServiceError::NotFound);
        }
        if status == 401 {
            return Err(ServiceError::Api("invalid GitHub token".to_string()));
        }
        // GitHub signals both abuse limits and quota exhaustion with 403/429.
        if status == 429 || status == 403 {
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

        let user: UserResponse = response.json().await.map_err(parse_error)?;
        Ok(ServiceReport::GitHub(GitHubReport {
            login: user.login,
            name: user.name,
            company: user.company,
            location: user.location,
            blog: user.blog.filter(|b| !b.is_empty()),
            bio: user.bio,
            public_repos: user.public_repos,
            followers: user.followers,
            created_at: user.created_at,
            profile_url: user.html_url,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    name: Option<String>,
    company: Option<String>,
    location: Option<String>,
    blog: Option<String>,
    bio: Option<String>,
    #[serde(default)]
    public_repos: u32,
    #[serde(default)]
    followers: u32,
    created_at: Option<String>,
    html_url: Option<String>,
}
