//! Mock services for testing the aggregation pipeline without a network.
//!
//! `MockIntelService` returns a canned outcome for its key, optionally
//! after a delay (for latency assertions), and counts how often it was
//! invoked (for never-called assertions).

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Duration;

use crate::classify::Detection;
use crate::intel::services::{
    AbuseIpdbReport, BreachReport, CtLogReport, DnsReport, EmailRepReport, GitHubReport,
    GreyNoiseReport, IocFeedReport, OtxReport, ShodanReport, UrlHausReport, UrlScanReport,
    VirusTotalReport,
};
use crate::intel::{IntelService, ServiceError, ServiceKey, ServiceReport};

/// A mock adapter with a fixed outcome.
pub struct MockIntelService {
    key: ServiceKey,
    outcome: Mutex<Result<ServiceReport, ServiceError>>,
    delay: Option<Duration>,
    configured: bool,
    calls: AtomicUsize,
}

impl MockIntelService {
    pub fn ok(key: ServiceKey, report: ServiceReport) -> Self {
        Self {
            key,
            outcome: Mutex::new(Ok(report)),
            delay: None,
            configured: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn err(key: ServiceKey, error: ServiceError) -> Self {
        Self {
            key,
            outcome: Mutex::new(Err(error)),
            delay: None,
            configured: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// How many lookups reached this mock.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntelService for MockIntelService {
    fn key(&self) -> ServiceKey {
        self.key
    }

    fn configured(&self) -> bool {
        self.configured
    }

    async fn lookup(&self, _indicator: &Detection) -> Result<ServiceReport, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.lock().unwrap().clone()
    }
}

/// A minimal valid report for any service key, for tests that only care
/// about which keys appear in the response.
pub fn canned_report(key: ServiceKey) -> ServiceReport {
    match key {
        ServiceKey::Shodan => ServiceReport::Shodan(ShodanReport {
            ip: "192.0.2.1".to_string(),
            org: Some("Test Org".to_string()),
            isp: None,
            os: None,
            country: None,
            open_ports: vec![22, 443],
            hostnames: vec![],
            vulns: vec![],
            banners: vec![],
            last_update: None,
        }),
        ServiceKey::GreyNoise => ServiceReport::GreyNoise(GreyNoiseReport {
            ip: "192.0.2.1".to_string(),
            noise: false,
            riot: false,
            classification: Some("benign".to_string()),
            actor: None,
            last_seen: None,
            link: None,
        }),
        ServiceKey::AbuseIpdb => ServiceReport::AbuseIpdb(AbuseIpdbReport {
            ip_address: "192.0.2.1".to_string(),
            abuse_confidence_score: 0,
            total_reports: 0,
            distinct_reporters: 0,
            country_code: None,
            isp: None,
            usage_type: None,
            last_reported_at: None,
        }),
        ServiceKey::Otx => ServiceReport::Otx(OtxReport {
            pulse_count: 0,
            pulses: vec![],
        }),
        ServiceKey::CrtSh => ServiceReport::CrtSh(CtLogReport {
            entry_count: 1,
            subdomains: vec!["www.example.com".to_string()],
            issuers: vec![],
        }),
        ServiceKey::SecurityTrails => ServiceReport::SecurityTrails(DnsReport {
            hostname: "example.com".to_string(),
            apex_domain: None,
            a: vec![],
            aaaa: vec![],
            mx: vec![],
            ns: vec![],
            txt: vec![],
            alexa_rank: None,
        }),
        ServiceKey::VirusTotal => ServiceReport::VirusTotal(VirusTotalReport {
            detections: 0,
            total_engines: 70,
            scan_date: None,
            permalink: None,
            engine_hits: vec![],
        }),
        ServiceKey::ThreatFox => ServiceReport::ThreatFox(IocFeedReport {
            match_count: 0,
            matches: vec![],
        }),
        ServiceKey::UrlHaus => ServiceReport::UrlHaus(UrlHausReport {
            threat: None,
            url_status: None,
            tags: vec![],
            first_seen: None,
            related_count: 0,
        }),
        ServiceKey::UrlScan => ServiceReport::UrlScan(UrlScanReport {
            total: 0,
            scans: vec![],
        }),
        ServiceKey::Hibp => ServiceReport::Hibp(BreachReport {
            breach_count: 0,
            breaches: vec![],
        }),
        ServiceKey::EmailRep => ServiceReport::EmailRep(EmailRepReport {
            email: "test@example.com".to_string(),
            reputation: None,
            suspicious: false,
            references: 0,
            blacklisted: false,
            malicious_activity: false,
            credentials_leaked: false,
            first_seen: None,
            profiles: vec![],
        }),
        ServiceKey::GitHub => ServiceReport::GitHub(GitHubReport {
            login: "octocat".to_string(),
            name: None,
            company: None,
            location: None,
            blog: None,
            bio: None,
            public_repos: 0,
            followers: 0,
            created_at: None,
            profile_url: None,
        }),
    }
}
