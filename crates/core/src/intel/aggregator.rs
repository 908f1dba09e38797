//! The aggregation entry point: classify, route, fan out, merge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::config::IntelConfig;
use crate::metrics;

use super::rate_limiter::RateLimiter;
use super::registry::services_for;
use super::services::{
    AbuseIpdbService, CrtShService, EmailRepService, GitHubService, GreyNoiseService,
    HibpService, OtxService, SecurityTrailsService, ShodanService, ThreatFoxService,
    UrlHausService, UrlScanService, VirusTotalService,
};
use super::types::{
    IntelResponse, IntelService, LookupError, ServiceKey, ServiceReport, ServiceStatus,
};

/// Key used in the `errors` map when no service applies to the query.
pub const GENERAL_ERROR_KEY: &str = "general";

/// Fans one classified query out to every relevant service concurrently and
/// merges the settled outcomes into an [`IntelResponse`].
///
/// Holds the only shared mutable state in the engine: the rate-limiter
/// bucket pool, shared by every adapter across every concurrent request.
pub struct IntelAggregator {
    services: HashMap<ServiceKey, Arc<dyn IntelService>>,
}

impl IntelAggregator {
    /// Build the full adapter set from configuration.
    pub fn new(config: &IntelConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new());

        let adapters: Vec<Arc<dyn IntelService>> = vec![
            Arc::new(ShodanService::new(config, Arc::clone(&limiter))),
            Arc::new(GreyNoiseService::new(config, Arc::clone(&limiter))),
            Arc::new(AbuseIpdbService::new(config, Arc::clone(&limiter))),
            Arc::new(OtxService::new(config, Arc::clone(&limiter))),
            Arc::new(CrtShService::new(config, Arc::clone(&limiter))),
            Arc::new(SecurityTrailsService::new(config, Arc::clone(&limiter))),
            Arc::new(VirusTotalService::new(config, Arc::clone(&limiter))),
            Arc::new(ThreatFoxService::new(config, Arc::clone(&limiter))),
            Arc::new(UrlHausService::new(config, Arc::clone(&limiter))),
            Arc::new(UrlScanService::new(config, Arc::clone(&limiter))),
            Arc::new(HibpService::new(config, Arc::clone(&limiter))),
            Arc::new(EmailRepService::new(config, Arc::clone(&limiter))),
            Arc::new(GitHubService::new(config, Arc::clone(&limiter))),
        ];

        Self::with_services(adapters)
    }

    /// Build an aggregator over an arbitrary adapter set. Used by tests to
    /// inject mocks; dispatch still goes through the registry.
    pub fn with_services(adapters: Vec<Arc<dyn IntelService>>) -> Self {
        let services = adapters
            .into_iter()
            .map(|svc| (svc.key(), svc))
            .collect();
        Self { services }
    }

    /// Classify `raw` and query every relevant service.
    ///
    /// Waits for all dispatched calls to settle; a failed service never
    /// fails the request. For every service invoked, its response key lands
    /// in exactly one of `results` or `errors`.
    pub async fn lookup(&self, raw: &str) -> Result<IntelResponse, LookupError> {
        let query = raw.trim();
        if query.is_empty() {
            return Err(LookupError::EmptyQuery);
        }

        let start = Instant::now();
        let detection = classify(query);
        metrics::INTEL_LOOKUPS
            .with_label_values(&[detection.kind.as_str()])
            .inc();

        let candidates = services_for(detection.kind);
        if candidates.is_empty() {
            debug!(query = %query, "no candidate services for query");
            let mut errors = HashMap::new();
            errors.insert(
                GENERAL_ERROR_KEY.to_string(),
                format!("could not determine indicator type for '{query}'"),
            );
            return Ok(IntelResponse {
                detection,
                results: HashMap::new(),
                errors,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        debug!(
            kind = detection.kind.as_str(),
            services = ?candidates.iter().map(|k| k.name()).collect::<Vec<_>>(),
            "dispatching intelligence lookups"
        );

        // Start every candidate at once; the join below is a hard barrier
        // that waits for all of them, success or failure.
        let lookups: Vec<_> = candidates
            .iter()
            .filter_map(|key| self.services.get(key).map(|svc| (*key, Arc::clone(svc))))
            .map(|(key, svc)| {
                let detection = detection.clone();
                async move { (key, svc.lookup(&detection).await) }
            })
            .collect();

        let settled = futures::future::join_all(lookups).await;

        let mut results: HashMap<String, ServiceReport> = HashMap::new();
        let mut errors: HashMap<String, String> = HashMap::new();
        for (key, outcome) in settled {
            match outcome {
                Ok(report) => {
                    metrics::SERVICE_LOOKUPS
                        .with_label_values(&[key.name(), "ok"])
                        .inc();
                    results.insert(key.response_key().to_string(), report);
                }
                Err(e) => {
                    warn!(service = %key, error = %e, "intelligence service lookup failed");
                    metrics::SERVICE_LOOKUPS
                        .with_label_values(&[key.name(), e.outcome_label()])
                        .inc();
                    errors.insert(key.response_key().to_string(), e.to_string());
                }
            }
        }

        let duration = start.elapsed();
        metrics::LOOKUP_DURATION
            .with_label_values(&[detection.kind.as_str()])
            .observe(duration.as_secs_f64());

        debug!(
            kind = detection.kind.as_str(),
            ok = results.len(),
            failed = errors.len(),
            duration_ms = duration.as_millis() as u64,
            "aggregation complete"
        );

        Ok(IntelResponse {
            detection,
            results,
            errors,
            duration_ms: duration.as_millis() as u64,
        })
    }

    /// Status of every registered adapter, sorted by service name.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        let mut entries: Vec<ServiceStatus> = self
            .services
            .values()
            .map(|svc| {
                let key = svc.key();
                ServiceStatus {
                    service: key.name().to_string(),
                    response_key: key.response_key().to_string(),
                    configured: svc.configured(),
                    requires_api_key: key.requires_api_key(),
                    rate_limit_per_minute: key.rate_limit().max_requests,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.service.cmp(&b.service));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{canned_report, MockIntelService};

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_classification() {
        let aggregator = IntelAggregator::with_services(vec![]);
        assert!(matches!(
            aggregator.lookup("   ").await,
            Err(LookupError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_unknown_query_short_circuits_with_general_error() {
        let aggregator = IntelAggregator::with_services(vec![]);
        let response = aggregator.lookup("not a valid indicator !!").await.unwrap();

        assert!(response.results.is_empty());
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors.contains_key(GENERAL_ERROR_KEY));
    }

    #[tokio::test]
    async fn test_results_use_response_keys() {
        let aggregator = IntelAggregator::with_services(vec![Arc::new(MockIntelService::ok(
            ServiceKey::CrtSh,
            canned_report(ServiceKey::CrtSh),
        ))]);

        let response = aggregator.lookup("example.com").await.unwrap();
        assert!(response.results.contains_key("crtSh"));
        assert!(!response.results.contains_key("crt-sh"));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_skipped_not_errored() {
        // Only one of the email services is registered; the other must not
        // appear in either map.
        let aggregator = IntelAggregator::with_services(vec![Arc::new(MockIntelService::ok(
            ServiceKey::Hibp,
            canned_report(ServiceKey::Hibp),
        ))]);

        let response = aggregator.lookup("a@example.com").await.unwrap();
        assert!(response.results.contains_key("hibp"));
        assert!(!response.results.contains_key("emailrep"));
        assert!(!response.errors.contains_key("emailrep"));
    }

    #[tokio::test]
    async fn test_service_status_sorted_and_complete() {
        let aggregator = IntelAggregator::with_services(vec![
            Arc::new(MockIntelService::ok(
                ServiceKey::Shodan,
                canned_report(ServiceKey::Shodan),
            )),
            Arc::new(MockIntelService::ok(
                ServiceKey::CrtSh,
                canned_report(ServiceKey::CrtSh),
            )),
        ]);

        let status = aggregator.service_status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].service, "crt-sh");
        assert_eq!(status[1].service, "shodan");
        assert!(!status[0].requires_api_key);
        assert!(status[1].requires_api_key);
    }
}
