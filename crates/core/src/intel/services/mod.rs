//! Service adapters for the thirteen upstream intelligence sources.
//!
//! Every adapter follows the same contract: check its credential first
//! (keyed services return `ApiKeyMissing` without any I/O), acquire from
//! its own rate-limit bucket, issue one bounded HTTP call, and normalize
//! the upstream's JSON into a fixed report shape with bounded lists.

mod abuseipdb;
mod crtsh;
mod emailrep;
mod github;
mod greynoise;
mod hibp;
mod otx;
mod securitytrails;
mod shodan;
mod threatfox;
mod urlhaus;
mod urlscan;
mod virustotal;

pub use abuseipdb::{AbuseIpdbReport, AbuseIpdbService};
pub use crtsh::{CrtShService, CtLogReport};
pub use emailrep::{EmailRepReport, EmailRepService};
pub use github::{GitHubReport, GitHubService};
pub use greynoise::{GreyNoiseReport, GreyNoiseService};
pub use hibp::{Breach, BreachReport, HibpService};
pub use otx::{OtxPulse, OtxReport, OtxService};
pub use securitytrails::{DnsReport, SecurityTrailsService};
pub use shodan::{ShodanBanner, ShodanReport, ShodanService};
pub use threatfox::{IocFeedReport, IocMatch, ThreatFoxService};
pub use urlhaus::{UrlHausReport, UrlHausService};
pub use urlscan::{UrlScanHit, UrlScanReport, UrlScanService};
pub use virustotal::{EngineHit, VirusTotalReport, VirusTotalService};

use reqwest::Client;
use std::time::Duration;

use super::types::ServiceError;

/// User agent sent on every outbound call.
const USER_AGENT: &str = concat!("argus/", env!("CARGO_PKG_VERSION"));

/// Build the bounded HTTP client shared by an adapter's calls.
///
/// The timeout is the adapter's only latency bound; there is no additional
/// deadline above it.
pub(crate) fn http_client(timeout_secs: u32) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs as u64))
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to create HTTP client")
}

/// Map a transport failure onto the error taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Api(format!("request timed out: {e}"))
    } else {
        ServiceError::Api(e.to_string())
    }
}

/// Map a JSON decode failure onto the error taxonomy.
pub(crate) fn parse_error(e: reqwest::Error) -> ServiceError {
    ServiceError::Api(format!("failed to parse response: {e}"))
}

/// Seconds to wait after an upstream 429, from the Retry-After header when
/// present.
pub(crate) fn retry_after_secs(response: &reqwest::Response, fallback: u64) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(fallback)
}

/// Truncate a normalized list to its bounded top-N.
pub(crate) fn truncate<T>(mut items: Vec<T>, cap: usize) -> Vec<T> {
    items.truncate(cap);
    items
}
