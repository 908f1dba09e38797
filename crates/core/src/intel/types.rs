//! Types shared across the intelligence aggregation engine.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

use crate::classify::Detection;

use super::services::{
    AbuseIpdbReport, BreachReport, CtLogReport, DnsReport, EmailRepReport, GitHubReport,
    GreyNoiseReport, IocFeedReport, OtxReport, ShodanReport, UrlHausReport, UrlScanReport,
    VirusTotalReport,
};

/// Identity of an upstream intelligence service.
///
/// Each key carries two fixed names: [`name`](ServiceKey::name) is the
/// internal key used for rate-limiter buckets, the registry, and logging;
/// [`response_key`](ServiceKey::response_key) is the canonical key in the
/// response envelope. Three internal names are hyphenated and remap to
/// camelCase response keys; the rest map to themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    Shodan,
    GreyNoise,
    AbuseIpdb,
    Otx,
    CrtSh,
    SecurityTrails,
    VirusTotal,
    ThreatFox,
    UrlHaus,
    UrlScan,
    Hibp,
    EmailRep,
    GitHub,
}

impl ServiceKey {
    pub const ALL: [ServiceKey; 13] = [
        ServiceKey::Shodan,
        ServiceKey::GreyNoise,
        ServiceKey::AbuseIpdb,
        ServiceKey::Otx,
        ServiceKey::CrtSh,
        ServiceKey::SecurityTrails,
        ServiceKey::VirusTotal,
        ServiceKey::ThreatFox,
        ServiceKey::UrlHaus,
        ServiceKey::UrlScan,
        ServiceKey::Hibp,
        ServiceKey::EmailRep,
        ServiceKey::GitHub,
    ];

    /// Internal service name (rate-limiter key, registry, logs).
    pub fn name(self) -> &'static str {
        match self {
            ServiceKey::Shodan => "shodan",
            ServiceKey::GreyNoise => "grey-noise",
            ServiceKey::AbuseIpdb => "abuse-ipdb",
            ServiceKey::Otx => "otx",
            ServiceKey::CrtSh => "crt-sh",
            ServiceKey::SecurityTrails => "securitytrails",
            ServiceKey::VirusTotal => "virustotal",
            ServiceKey::ThreatFox => "threatfox",
            ServiceKey::UrlHaus => "urlhaus",
            ServiceKey::UrlScan => "urlscan",
            ServiceKey::Hibp => "hibp",
            ServiceKey::EmailRep => "emailrep",
            ServiceKey::GitHub => "github",
        }
    }

    /// Canonical key in the response envelope.
    ///
    /// Hyphenated internal names are not identifier-safe for API consumers,
    /// so they remap to camelCase here. This table must stay in sync with
    /// the registry; see the remap test in `registry.rs`.
    pub fn response_key(self) -> &'static str {
        match self {
            ServiceKey::GreyNoise => "greyNoise",
            ServiceKey::AbuseIpdb => "abuseIpdb",
            ServiceKey::CrtSh => "crtSh",
            other => other.name(),
        }
    }

    /// Per-service rate limit. Every service has its own bucket and its own
    /// ceiling, distinct from every other service.
    pub fn rate_limit(self) -> RateLimit {
        let per_minute = |max_requests| RateLimit {
            max_requests,
            window: Duration::from_secs(60),
        };
        match self {
            ServiceKey::Shodan => per_minute(10),
            ServiceKey::GreyNoise => per_minute(12),
            ServiceKey::AbuseIpdb => per_minute(30),
            ServiceKey::Otx => per_minute(25),
            ServiceKey::CrtSh => per_minute(20),
            ServiceKey::SecurityTrails => per_minute(5),
            ServiceKey::VirusTotal => per_minute(4),
            ServiceKey::ThreatFox => per_minute(45),
            ServiceKey::UrlHaus => per_minute(40),
            ServiceKey::UrlScan => per_minute(60),
            ServiceKey::Hibp => per_minute(9),
            ServiceKey::EmailRep => per_minute(8),
            ServiceKey::GitHub => per_minute(50),
        }
    }

    /// The environment variable that can supply this service's credential.
    /// `None` for the credential-free services.
    pub fn credential_env_var(self) -> Option<&'static str> {
        match self {
            ServiceKey::Shodan => Some("SHODAN_API_KEY"),
            ServiceKey::GreyNoise => Some("GREYNOISE_API_KEY"),
            ServiceKey::AbuseIpdb => Some("ABUSEIPDB_API_KEY"),
            ServiceKey::Otx => Some("OTX_API_KEY"),
            ServiceKey::CrtSh => None,
            ServiceKey::SecurityTrails => Some("SECURITYTRAILS_API_KEY"),
            ServiceKey::VirusTotal => Some("VT_API_KEY"),
            ServiceKey::ThreatFox => None,
            ServiceKey::UrlHaus => None,
            ServiceKey::UrlScan => Some("URLSCAN_API_KEY"),
            ServiceKey::Hibp => Some("HIBP_API_KEY"),
            ServiceKey::EmailRep => Some("EMAILREP_API_KEY"),
            ServiceKey::GitHub => Some("GITHUB_TOKEN"),
        }
    }

    /// Whether this service needs a credential at all.
    pub fn requires_api_key(self) -> bool {
        self.credential_env_var().is_some()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rate limit for a single service: `max_requests` per fixed `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

/// Errors a service lookup can produce.
///
/// Adapters never let any other failure escape: every failure path (missing
/// credential, limiter rejection, upstream status, parse failure, transport
/// timeout) maps onto one of these four codes.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("API key not configured")]
    ApiKeyMissing,

    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("no record found")]
    NotFound,

    #[error("API error: {0}")]
    Api(String),
}

impl ServiceError {
    /// Stable label for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ServiceError::ApiKeyMissing => "api_key_missing",
            ServiceError::RateLimited { .. } => "rate_limited",
            ServiceError::NotFound => "not_found",
            ServiceError::Api(_) => "api_error",
        }
    }
}

/// Normalized payload from one upstream service.
///
/// The aggregator only ever handles this wrapper; the per-service shapes
/// live with their adapters.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServiceReport {
    Shodan(ShodanReport),
    GreyNoise(GreyNoiseReport),
    AbuseIpdb(AbuseIpdbReport),
    Otx(OtxReport),
    CrtSh(CtLogReport),
    SecurityTrails(DnsReport),
    VirusTotal(VirusTotalReport),
    ThreatFox(IocFeedReport),
    UrlHaus(UrlHausReport),
    UrlScan(UrlScanReport),
    Hibp(BreachReport),
    EmailRep(EmailRepReport),
    GitHub(GitHubReport),
}

/// Trait implemented by every service adapter.
#[async_trait]
pub trait IntelService: Send + Sync {
    /// Which service this adapter wraps.
    fn key(&self) -> ServiceKey;

    /// Whether the adapter has everything it needs to attempt a call.
    /// Credential-free services are always configured.
    fn configured(&self) -> bool {
        true
    }

    /// Query the upstream for one indicator.
    ///
    /// Must not panic and must map every failure into [`ServiceError`].
    async fn lookup(&self, indicator: &Detection) -> Result<ServiceReport, ServiceError>;
}

/// Aggregated response for one query.
///
/// For every service invoked, its response key appears in exactly one of
/// `results` or `errors`; services not invoked appear in neither.
#[derive(Debug, Clone, Serialize)]
pub struct IntelResponse {
    pub detection: Detection,
    pub results: HashMap<String, ServiceReport>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub errors: HashMap<String, String>,
    pub duration_ms: u64,
}

/// Status of one configured adapter, for the service listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub response_key: String,
    pub configured: bool,
    pub requires_api_key: bool,
    pub rate_limit_per_minute: u32,
}

/// Errors from the aggregation entry point itself.
///
/// Per-service failures never surface here; they are folded into the
/// response's `errors` map.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("query must not be empty")]
    EmptyQuery,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_internal_names_unique() {
        let names: HashSet<_> = ServiceKey::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), ServiceKey::ALL.len());
    }

    #[test]
    fn test_response_keys_unique_and_identifier_safe() {
        let keys: HashSet<_> = ServiceKey::ALL.iter().map(|k| k.response_key()).collect();
        assert_eq!(keys.len(), ServiceKey::ALL.len());
        for key in keys {
            assert!(
                key.chars().all(|c| c.is_ascii_alphanumeric()),
                "response key {key:?} is not identifier-safe"
            );
        }
    }

    #[test]
    fn test_hyphenated_names_remap_to_camel_case() {
        assert_eq!(ServiceKey::CrtSh.name(), "crt-sh");
        assert_eq!(ServiceKey::CrtSh.response_key(), "crtSh");
        assert_eq!(ServiceKey::GreyNoise.name(), "grey-noise");
        assert_eq!(ServiceKey::GreyNoise.response_key(), "greyNoise");
        assert_eq!(ServiceKey::AbuseIpdb.name(), "abuse-ipdb");
        assert_eq!(ServiceKey::AbuseIpdb.response_key(), "abuseIpdb");
    }

    #[test]
    fn test_non_hyphenated_names_map_to_themselves() {
        for key in ServiceKey::ALL {
            if !key.name().contains('-') {
                assert_eq!(key.name(), key.response_key());
            }
        }
    }

    #[test]
    fn test_rate_limits_distinct_per_service() {
        let limits: HashSet<_> = ServiceKey::ALL
            .iter()
            .map(|k| k.rate_limit().max_requests)
            .collect();
        assert_eq!(limits.len(), ServiceKey::ALL.len());
    }

    #[test]
    fn test_exactly_three_credential_free_services() {
        let free: Vec<_> = ServiceKey::ALL
            .iter()
            .filter(|k| !k.requires_api_key())
            .map(|k| k.name())
            .collect();
        assert_eq!(free, vec!["crt-sh", "threatfox", "urlhaus"]);
    }

    #[test]
    fn test_service_error_messages() {
        assert_eq!(
            ServiceError::ApiKeyMissing.to_string(),
            "API key not configured"
        );
        assert_eq!(
            ServiceError::RateLimited {
                retry_after_secs: 30
            }
            .to_string(),
            "rate limited, retry in 30s"
        );
        assert_eq!(ServiceError::NotFound.to_string(), "no record found");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ServiceError::ApiKeyMissing.outcome_label(), "api_key_missing");
        assert_eq!(
            ServiceError::Api("boom".into()).outcome_label(),
            "api_error"
        );
    }
}
